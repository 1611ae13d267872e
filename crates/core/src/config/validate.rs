use super::{types::Config, ConfigError};
use crate::context::ConfigureReason;
use crate::data_type::DataTypeSet;

/// Validate configuration
/// Currently validates:
/// - Account id and cache guid are not empty
/// - Notification capacity is not 0
/// - Scenario reason is a real reason
/// - Scenario controllers are unique and not for control types
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.account.account_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "account.account_id cannot be empty".to_string(),
        ));
    }
    if config.account.cache_guid.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "account.cache_guid cannot be empty".to_string(),
        ));
    }

    if config.manager.notification_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "manager.notification_capacity cannot be 0".to_string(),
        ));
    }

    if config.scenario.reason == ConfigureReason::Unknown {
        return Err(ConfigError::ValidationError(
            "scenario.reason cannot be unknown".to_string(),
        ));
    }

    let mut seen = DataTypeSet::new();
    for controller in &config.scenario.controllers {
        let data_type = controller.data_type;
        if data_type.is_control() {
            return Err(ConfigError::ValidationError(format!(
                "scenario.controllers: {} is a control type and cannot have a controller",
                data_type
            )));
        }
        if seen.has(data_type) {
            return Err(ConfigError::ValidationError(format!(
                "scenario.controllers: duplicate controller for {}",
                data_type
            )));
        }
        seen.put(data_type);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerScenario, ScenarioConfig};
    use crate::controller::PreconditionState;
    use crate::data_type::DataType;

    fn controller(data_type: DataType) -> ControllerScenario {
        ControllerScenario {
            data_type,
            precondition: PreconditionState::Met,
            fail_load: None,
            proxy: false,
            initial_sync_done: true,
            transport_only: false,
            load_latency_ms: 0,
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let mut config = Config::default();
        config.scenario = ScenarioConfig {
            controllers: vec![controller(DataType::Bookmarks)],
            ..ScenarioConfig::default()
        };
        tokio_test::assert_ok!(validate_config(&config));
    }

    #[test]
    fn test_validate_empty_account_fails() {
        let mut config = Config::default();
        config.account.account_id = "  ".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let mut config = Config::default();
        config.manager.notification_capacity = 0;
        tokio_test::assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_unknown_reason_fails() {
        let mut config = Config::default();
        config.scenario.reason = ConfigureReason::Unknown;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_controller_fails() {
        let mut config = Config::default();
        config.scenario.controllers = vec![
            controller(DataType::Bookmarks),
            controller(DataType::Bookmarks),
        ];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_control_type_controller_fails() {
        let mut config = Config::default();
        config.scenario.controllers = vec![controller(DataType::Nigori)];
        assert!(validate_config(&config).is_err());
    }
}
