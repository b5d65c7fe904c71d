use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::client::{Endpoints, DEFAULT_BASE_URL, DEFAULT_RELAY_URL};
use crate::error::ConfigError;
use crate::models::SiteRequest;
use crate::utils::{dedupe_sites, is_valid_icao};

pub const ALPHA_TYPES: [&str; 10] = [
    "metar",
    "taf",
    "notam",
    "sigmet",
    "airmet",
    "pirep",
    "upperwind",
    "space_weather",
    "vfr_route",
    "area_forecast",
];

pub const IMAGE_TYPES: [&str; 9] = [
    "GFA/CLDWX",
    "GFA/TURBC",
    "GFA/WINDS",
    "SATELLITE/IR",
    "SATELLITE/VIS",
    "SATELLITE/WV",
    "RADAR/COMPOSITE",
    "RADAR/CAPPI_RAIN",
    "SIG_WX/HIGH_LEVEL",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    // one item at a time with `request_delay` between items
    #[default]
    Sequential,
    // all items of a site in flight at once, joined before the next site
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub primary_site: String,
    #[serde(default)]
    pub additional_sites: Vec<String>,
    // continuous mode period, seconds
    pub interval: u64,
    // pause after each item, milliseconds
    pub request_delay: u64,
    // per-request timeout, seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub policy: FetchPolicy,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_alpha_types")]
    pub alpha_types: Vec<String>,
    #[serde(default = "default_image_types")]
    pub image_types: Vec<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_alpha_types() -> Vec<String> {
    vec!["metar".to_string(), "taf".to_string()]
}

fn default_image_types() -> Vec<String> {
    vec!["GFA/CLDWX".to_string(), "GFA/TURBC".to_string()]
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            primary_site: "CYYT".to_string(),
            additional_sites: Vec::new(),
            interval: 300,
            request_delay: 500,
            request_timeout: default_request_timeout(),
            policy: FetchPolicy::Sequential,
            base_url: default_base_url(),
            relay_url: default_relay_url(),
            alpha_types: default_alpha_types(),
            image_types: default_image_types(),
        }
    }
}

impl DashboardConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            base_url: self.base_url.clone(),
            relay_url: self.relay_url.clone(),
        }
    }

    // primary plus additional sites, upper-cased, blanks and duplicates dropped
    pub fn sites(&self) -> Vec<String> {
        dedupe_sites(std::iter::once(&self.primary_site).chain(self.additional_sites.iter()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval",
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.relay_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "relay_url",
                message: "must not be empty".to_string(),
            });
        }
        let sites = self.sites();
        if sites.is_empty() {
            return Err(ConfigError::NoSites);
        }
        if let Some(bad) = sites.iter().find(|site| !is_valid_icao(site)) {
            return Err(ConfigError::InvalidIcao(bad.clone()));
        }
        Ok(())
    }

    pub fn site_requests(&self) -> Vec<SiteRequest> {
        build_requests(self.sites(), &self.alpha_types, &self.image_types)
    }
}

// requests for an explicit site list; selections are cleaned of blanks and repeats
pub fn build_requests<I, S>(sites: I, alpha_types: &[String], image_types: &[String]) -> Vec<SiteRequest>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let alpha_types = unique_codes(alpha_types, str::to_lowercase);
    let image_types = unique_codes(image_types, str::to_uppercase);
    dedupe_sites(sites)
        .into_iter()
        .map(|icao| SiteRequest {
            icao,
            alpha_types: alpha_types.clone(),
            image_types: image_types.clone(),
        })
        .collect()
}

pub(crate) fn unique_codes(codes: &[String], normalize: fn(&str) -> String) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for code in codes {
        let code = normalize(code.trim());
        if !unique.contains(&code) {
            unique.push(code);
        }
    }
    unique
}
