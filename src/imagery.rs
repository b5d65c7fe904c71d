use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::RemoteClient;
use crate::error::FetchResult;
use crate::gfa::probe_first;
use crate::models::DirectImageSet;

// no upstream documents satellite/radar file urls, these are guessed candidates.
// the navcanada one reuses the images root the gfa files are served from
pub const SATELLITE_IMAGE_BASES: [&str; 2] = [
    "https://weather.gc.ca/data/satellite/",
    "https://plan.navcanada.ca/weather/images/satellite/",
];

pub const RADAR_IMAGE_BASES: [&str; 2] = [
    "https://weather.gc.ca/data/radar/",
    "https://plan.navcanada.ca/weather/images/radar/",
];

const LATEST_PERIOD: &str = "latest";

// category prefix of a namespaced image code (`GFA/CLDWX` -> `Gfa`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCategory {
    Gfa,
    Satellite,
    Radar,
    SigWx,
    Other,
}

impl ImageCategory {
    pub fn of(code: &str) -> Self {
        let category = code.split('/').next().unwrap_or_default();
        match category.to_uppercase().as_str() {
            "GFA" => ImageCategory::Gfa,
            "SATELLITE" => ImageCategory::Satellite,
            "RADAR" => ImageCategory::Radar,
            "SIG_WX" => ImageCategory::SigWx,
            _ => ImageCategory::Other,
        }
    }

    // only satellite and radar have a direct-url fallback besides gfa
    fn probe_plan(self) -> Option<(&'static [&'static str], &'static str, &'static str)> {
        match self {
            ImageCategory::Satellite => {
                Some((&SATELLITE_IMAGE_BASES[..], "jpg", "direct_satellite_images"))
            }
            ImageCategory::Radar => Some((&RADAR_IMAGE_BASES[..], "gif", "direct_radar_images")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageResolution {
    Api {
        pattern: Option<String>,
        payload: Value,
    },
    // set.images may be empty
    Direct {
        set: DirectImageSet,
        api_error: Option<String>,
    },
}

impl ImageResolution {
    pub fn is_empty(&self) -> bool {
        matches!(self, ImageResolution::Direct { set, .. } if set.images.is_empty())
    }

    pub fn image_count(&self) -> Option<usize> {
        match self {
            ImageResolution::Api { .. } => None,
            ImageResolution::Direct { set, .. } => Some(set.images.len()),
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            ImageResolution::Api { payload, .. } => payload,
            ImageResolution::Direct { set, .. } => {
                serde_json::to_value(set).unwrap_or(Value::Null)
            }
        }
    }
}

// true when a structured response actually carries frames or items
pub fn has_imagery(value: &Value) -> bool {
    value
        .get("data")
        .and_then(Value::as_array)
        .map(|items| !items.is_empty())
        .unwrap_or(false)
        || value
            .get("images")
            .and_then(Value::as_array)
            .map(|items| !items.is_empty())
            .unwrap_or(false)
}

pub fn direct_image_url(base: &str, key: &str, product: &str, ext: &str) -> String {
    format!(
        "{}{}_{}.{}",
        base,
        key.to_lowercase(),
        product.to_lowercase(),
        ext
    )
}

pub struct ImageryResolver {
    client: RemoteClient,
}

impl ImageryResolver {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub async fn resolve(
        &self,
        site: &str,
        region: Option<&str>,
        image_code: &str,
    ) -> FetchResult<ImageResolution> {
        let Some((bases, ext, kind)) = ImageCategory::of(image_code).probe_plan() else {
            let payload = self.client.fetch_image(site, image_code).await?;
            return Ok(ImageResolution::Api {
                pattern: None,
                payload,
            });
        };

        let api_error = match self.client.fetch_image(site, image_code).await {
            Ok(payload) if has_imagery(&payload) => {
                return Ok(ImageResolution::Api {
                    pattern: None,
                    payload,
                });
            }
            Ok(_) => {
                debug!(site = %site, image = %image_code, "Image api returned no frames");
                None
            }
            Err(e) => {
                warn!(site = %site, image = %image_code, error = %e, "Image api failed, probing direct urls");
                Some(e.to_string())
            }
        };

        let product = image_code
            .split('/')
            .nth(1)
            .unwrap_or(image_code)
            .to_lowercase();
        let key = region.unwrap_or(site);
        let candidates: Vec<String> = bases
            .iter()
            .map(|base| direct_image_url(base, key, &product, ext))
            .collect();

        let images: Vec<_> = probe_first(&self.client, LATEST_PERIOD, &candidates)
            .await
            .into_iter()
            .collect();

        info!(site = %site, image = %image_code, found = images.len(), "Direct image probing finished");

        Ok(ImageResolution::Direct {
            set: DirectImageSet {
                kind: kind.to_string(),
                gfa_region: region.map(str::to_string),
                site: site.to_string(),
                product,
                images,
            },
            api_error,
        })
    }
}
