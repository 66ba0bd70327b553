use tracing::instrument;

use super::model::{ServiceInfo, find_service};
use crate::detect::DeviceModel;
use crate::error::ConnectError;
use crate::protocol::{endpoint_metadata, endpoints_for};

/// Checks that a connected peripheral is the Power Watchdog generation the
/// coordinator was configured for.
///
/// The generation's service must be present and carry its notify
/// characteristic, and the advertised name, when the adapter still reports
/// one, must classify into the same generation. Models configured with a
/// `PMD`/`PWS` name also require the advertised name to carry such a prefix.
#[instrument(skip(services), level = "debug", fields(generation = %model.generation(), service_count = services.len()))]
pub(crate) fn validate_identity(
    model: &DeviceModel,
    services: &[ServiceInfo],
    local_name: Option<&str>,
) -> Result<(), ConnectError> {
    let generation = model.generation();
    let endpoints = endpoints_for(generation);

    let has_notify = find_service(services, endpoint_metadata(endpoints.service).uuid())
        .and_then(|service| service.characteristic(endpoint_metadata(endpoints.notify).uuid()))
        .is_some_and(|characteristic| characteristic.can_notify());
    if !has_notify {
        return Err(ConnectError::ServiceMismatch {
            generation,
            service: endpoints.service,
        });
    }

    if !model.name_matches(local_name) {
        return Err(ConnectError::NameMismatch {
            generation,
            name: local_name.unwrap_or_default().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::detect::{Generation, ModelDetector};
    use crate::hw::CharacteristicInfo;
    use crate::protocol::EndpointId;

    fn gen2_services() -> Vec<ServiceInfo> {
        vec![ServiceInfo::new(
            "000000FF-0000-1000-8000-00805F9B34FB",
            vec![CharacteristicInfo::new(
                "0000ff01-0000-1000-8000-00805f9b34fb",
                true,
                true,
            )],
        )]
    }

    fn gen1_services() -> Vec<ServiceInfo> {
        vec![ServiceInfo::new(
            "0000FFE0-0000-1000-8000-00805F9B34FB",
            vec![
                CharacteristicInfo::new("0000ffe2-0000-1000-8000-00805f9b34fb", true, false),
                CharacteristicInfo::new("0000fff5-0000-1000-8000-00805f9b34fb", false, true),
            ],
        )]
    }

    #[test]
    fn accepts_matching_service_case_insensitively() {
        let model = ModelDetector::detect("WD_V6_01");
        assert_matches!(
            validate_identity(&model, &gen2_services(), Some("WD_V6_01")),
            Ok(())
        );
    }

    #[test]
    fn accepts_missing_local_name() {
        let model = ModelDetector::detect("WD_V6_01");
        assert_matches!(validate_identity(&model, &gen2_services(), None), Ok(()));
    }

    #[test]
    fn rejects_other_generation_service() {
        let model = ModelDetector::detect("PMD30");
        assert_matches!(
            validate_identity(&model, &gen2_services(), Some("PMD30")),
            Err(ConnectError::ServiceMismatch {
                generation: Generation::Gen1,
                service: EndpointId::Gen1Service,
            })
        );
    }

    #[test]
    fn rejects_service_without_notify_characteristic() {
        let model = ModelDetector::detect("WD_V6_01");
        let services = vec![ServiceInfo::new(
            "000000ff-0000-1000-8000-00805f9b34fb",
            Vec::new(),
        )];
        assert_matches!(
            validate_identity(&model, &services, None),
            Err(ConnectError::ServiceMismatch { .. })
        );
    }

    #[test]
    fn rejects_notify_characteristic_that_cannot_notify() {
        let model = ModelDetector::detect("WD_V6_01");
        let services = vec![ServiceInfo::new(
            "000000ff-0000-1000-8000-00805f9b34fb",
            vec![CharacteristicInfo::new(
                "0000ff01-0000-1000-8000-00805f9b34fb",
                false,
                true,
            )],
        )];
        assert_matches!(
            validate_identity(&model, &services, None),
            Err(ConnectError::ServiceMismatch { .. })
        );
    }

    #[test]
    fn rejects_name_from_other_generation() {
        let model = ModelDetector::detect("WD_V6_01");
        assert_matches!(
            validate_identity(&model, &gen2_services(), Some("PMD30")),
            Err(ConnectError::NameMismatch { name, .. }) if name == "PMD30"
        );
    }

    #[test]
    fn accepts_gen1_name_with_known_prefix() {
        let model = ModelDetector::detect("PMD30");
        assert_matches!(
            validate_identity(&model, &gen1_services(), Some("PWS50-1234")),
            Ok(())
        );
    }

    #[test]
    fn rejects_unrelated_gen1_name() {
        let model = ModelDetector::detect("PMD30");
        assert_matches!(
            validate_identity(&model, &gen1_services(), Some("HMSoft")),
            Err(ConnectError::NameMismatch {
                generation: Generation::Gen1,
                name,
            }) if name == "HMSoft"
        );
    }
}
