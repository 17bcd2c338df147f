use super::*;

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            controls: ControlsConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: String::new(),
            rfid: None,
            rfid_class: None,
            phases: 3,
            max_current: 63.0,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            min_current: 6.0,
            max_current: 63.0,
            line_voltage: 230.0,
            phase_switch_cooldown_seconds: 300,
            transport_timeout_ms: 2000,
            command_queue_capacity: 64,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            failsafe_file: "/data/keba_failsafe.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/keba-control.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}
