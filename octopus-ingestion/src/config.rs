use serde::Deserialize;
use std::{env, fmt, fs, net::SocketAddr, str::FromStr, time::Duration};

use octopus_client::{
    api::{DEFAULT_GRAPHQL_URL, DEFAULT_REST_BASE_URL},
    domain::MeterKind,
};

/// Value of the `app` tag carried by every point.
pub const APP_NAME: &str = "octopus-energy-consumption-metrics";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone)]
pub struct OctopusConfig {
    pub api_key: String,
    pub account_number: Option<String>,
    pub page_size: u32,
    pub rest_base_url: String,
    pub graphql_url: String,
}

impl fmt::Debug for OctopusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctopusConfig")
            .field("api_key", &"*****")
            .field("account_number", &self.account_number)
            .field("page_size", &self.page_size)
            .field("rest_base_url", &self.rest_base_url)
            .field("graphql_url", &self.graphql_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MeterConfig {
    pub kind: MeterKind,
    pub meter_point: String,
    pub serial: String,
    /// Pence per unit. `None` disables cost points for this meter.
    pub cost_rate: Option<f64>,
}

#[derive(Clone)]
pub struct InfluxDbConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl fmt::Debug for InfluxDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDbConfig")
            .field("url", &self.url)
            .field("token", &"*****")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub channel_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: SocketAddr,
}

/// Optional TOML file with tuning that does not belong in the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TuningFile {
    sink: SinkConfig,
    metrics: Option<MetricsConfig>,
}

impl TuningFile {
    fn read(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub octopus: OctopusConfig,
    pub electricity: MeterConfig,
    pub gas: MeterConfig,
    pub influxdb: InfluxDbConfig,
    pub loop_interval: Duration,
    pub sink: SinkConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value lookup. Empty values count
    /// as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let octopus = OctopusConfig {
            api_key: vars.required("OCTO_API_KEY")?,
            account_number: vars.optional("OCTO_ACCOUNT_NUMBER"),
            page_size: vars.required_parsed("PAGE_SIZE", positive)?,
            rest_base_url: vars
                .optional("OCTO_API_URL")
                .unwrap_or_else(|| DEFAULT_REST_BASE_URL.to_string()),
            graphql_url: vars
                .optional("OCTO_GRAPHQL_URL")
                .unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
        };

        let electricity = MeterConfig {
            kind: MeterKind::Electricity,
            meter_point: vars.required("OCTO_ELECTRIC_MPAN")?,
            serial: vars.required("OCTO_ELECTRIC_SN")?,
            cost_rate: vars.optional_parsed("OCTO_ELECTRIC_COST", finite)?,
        };

        let gas = MeterConfig {
            kind: MeterKind::Gas,
            meter_point: vars.required("OCTO_GAS_MPRN")?,
            serial: vars.required("OCTO_GAS_SN")?,
            cost_rate: vars.optional_parsed("OCTO_GAS_COST", finite)?,
        };

        let influxdb = InfluxDbConfig {
            url: vars.required("INFLUXDB_URL")?,
            token: vars.required("INFLUXDB_TOKEN")?,
            org: vars.required("INFLUXDB_ORG")?,
            bucket: vars.required("INFLUXDB_BUCKET")?,
        };

        let loop_secs: u64 = vars.required_parsed("LOOP_TIME", positive)?;

        let tuning = match vars.optional("INGESTION_CONFIG") {
            Some(path) => TuningFile::read(&path)?,
            None => TuningFile::default(),
        };
        if tuning.sink.batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "sink.batch_size",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            octopus,
            electricity,
            gas,
            influxdb,
            loop_interval: Duration::from_secs(loop_secs),
            sink: tuning.sink,
            metrics: tuning.metrics,
        })
    }

    pub fn meter(&self, kind: MeterKind) -> &MeterConfig {
        match kind {
            MeterKind::Electricity => &self.electricity,
            MeterKind::Gas => &self.gas,
        }
    }

    /// Startup banner. Secrets are masked.
    pub fn log_settings(&self) {
        tracing::info!(
            electricity_mpan = %self.electricity.meter_point,
            electricity_sn = %self.electricity.serial,
            electricity_cost = ?self.electricity.cost_rate,
            gas_mprn = %self.gas.meter_point,
            gas_sn = %self.gas.serial,
            gas_cost = ?self.gas.cost_rate,
            account_number = ?self.octopus.account_number,
            page_size = self.octopus.page_size,
            "Octopus settings"
        );
        tracing::info!(
            url = %self.influxdb.url,
            org = %self.influxdb.org,
            bucket = %self.influxdb.bucket,
            loop_secs = self.loop_interval.as_secs(),
            batch_size = self.sink.batch_size,
            "InfluxDB settings"
        );
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn parse<T>(&self, var: &'static str, value: String, check: fn(&T) -> Result<(), String>) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let parsed = value.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: value.clone(),
            reason: e.to_string(),
        })?;
        check(&parsed).map_err(|reason| ConfigError::Invalid { var, value, reason })?;
        Ok(parsed)
    }

    fn required_parsed<T>(&self, var: &'static str, check: fn(&T) -> Result<(), String>) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.required(var)?;
        self.parse(var, value, check)
    }

    fn optional_parsed<T>(
        &self,
        var: &'static str,
        check: fn(&T) -> Result<(), String>,
    ) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(var)
            .map(|value| self.parse(var, value, check))
            .transpose()
    }
}

fn positive<T: PartialOrd + Default>(v: &T) -> Result<(), String> {
    if *v > T::default() {
        Ok(())
    } else {
        Err("must be greater than zero".to_string())
    }
}

fn finite(v: &f64) -> Result<(), String> {
    if v.is_finite() {
        Ok(())
    } else {
        Err("must be a finite number".to_string())
    }
}
