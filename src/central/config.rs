//! Session-layer configuration.

use crate::bgapi::ConnectionConfig;
use crate::gatt::GattError;
use std::time::Duration;

/// Scan interval/window in 625 µs units plus active-scanning flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    pub interval: u16,
    pub window: u16,
    /// Active scanning requests scan responses from peripherals.
    pub active: bool,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            interval: 0x004B,
            window: 0x0032,
            active: true,
        }
    }
}

impl ScanParameters {
    pub fn validate(&self) -> Result<(), GattError> {
        if self.window == 0 || self.interval == 0 {
            return Err(GattError::InvalidConfig(
                "scan interval and window must be non-zero".into(),
            ));
        }
        if self.window > self.interval {
            return Err(GattError::InvalidConfig(
                "scan window must not exceed the interval".into(),
            ));
        }
        Ok(())
    }
}

/// Connection establishment parameters. Intervals are in 1.25 ms
/// units, the supervision timeout in 10 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub timeout: u16,
    pub latency: u16,
}

impl Default for ConnectParameters {
    fn default() -> Self {
        Self {
            interval_min: 60,
            interval_max: 76,
            timeout: 100,
            latency: 0,
        }
    }
}

impl ConnectParameters {
    pub fn validate(&self) -> Result<(), GattError> {
        if self.interval_min > self.interval_max {
            return Err(GattError::InvalidConfig(
                "interval_min must not exceed interval_max".into(),
            ));
        }
        if self.timeout == 0 {
            return Err(GattError::InvalidConfig(
                "supervision timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the central needs tuned in one place.
#[derive(Debug, Clone)]
pub struct CentralConfig {
    pub connection: ConnectionConfig,
    pub scan: ScanParameters,
    pub connect: ConnectParameters,
    /// How long an ATT procedure may run before the adapter is pinged.
    pub procedure_timeout: Duration,
    /// Cadence of the peripheral liveness ticker.
    pub liveness_interval: Duration,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            scan: ScanParameters::default(),
            connect: ConnectParameters::default(),
            procedure_timeout: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(2),
        }
    }
}

impl CentralConfig {
    pub fn validate(&self) -> Result<(), GattError> {
        self.connection
            .validate()
            .map_err(GattError::Protocol)?;
        self.scan.validate()?;
        self.connect.validate()?;
        if self.procedure_timeout.is_zero() {
            return Err(GattError::InvalidConfig(
                "procedure_timeout must be non-zero".into(),
            ));
        }
        if self.liveness_interval.is_zero() {
            return Err(GattError::InvalidConfig(
                "liveness_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(CentralConfig::default().validate().is_ok());
    }

    #[test]
    fn test_scan_window_bounds() {
        let params = ScanParameters {
            interval: 0x0032,
            window: 0x004B,
            active: false,
        };
        assert!(matches!(
            params.validate(),
            Err(GattError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_connect_interval_order() {
        let params = ConnectParameters {
            interval_min: 80,
            interval_max: 60,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
