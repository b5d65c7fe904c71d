use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::RemoteClient;
use crate::imagery::ImageResolution;
use crate::models::{DirectImage, DirectImageSet};
use crate::utils::cache_buster;

pub const GFA_PERIODS: [&str; 4] = ["000", "006", "012", "018"];

pub const GFA_IMAGE_BASES: [&str; 3] = [
    "https://flightplanning.navcanada.ca/Latest/gfa/anglais/images/",
    "https://plan.navcanada.ca/weather/images/gfa/",
    "https://plan.navcanada.ca/static/gfa/",
];

const DEFAULT_PRODUCT: &str = "CLDWX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfaRequest<'a> {
    pub site: &'a str,
    pub region: &'a str,
    pub image_code: &'a str,
}

impl<'a> GfaRequest<'a> {
    // `GFA/CLDWX` -> `CLDWX`
    pub fn product(&self) -> &'a str {
        self.image_code
            .split('/')
            .nth(1)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PRODUCT)
    }
}

pub type QueryShape = fn(&GfaRequest) -> String;

fn shape_site_region_path(req: &GfaRequest) -> String {
    format!("site={}&image=GFA/{}/{}", req.site, req.region, req.product())
}

fn shape_site_gfa_region(req: &GfaRequest) -> String {
    format!("site={}&gfa_region={}&image={}", req.site, req.region, req.image_code)
}

fn shape_region_only(req: &GfaRequest) -> String {
    format!("gfa_region={}&image={}", req.region, req.image_code)
}

fn shape_alpha_gfa(req: &GfaRequest) -> String {
    format!("site={}&alpha=gfa&gfa_region={}", req.site, req.region)
}

fn shape_site_region_param(req: &GfaRequest) -> String {
    format!("site={}&image={}&region={}", req.site, req.image_code, req.region)
}

// tried in this order; first GFA-shaped OK response wins
pub const GFA_QUERY_SHAPES: [QueryShape; 5] = [
    shape_site_region_path,
    shape_site_gfa_region,
    shape_region_only,
    shape_alpha_gfa,
    shape_site_region_param,
];

// a response counts as GFA data when some key mentions "gfa" or holds a non-empty array
pub fn is_gfa_shaped(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => map.iter().any(|(key, value)| {
            key.to_lowercase().contains("gfa")
                || value.as_array().map(|a| !a.is_empty()).unwrap_or(false)
        }),
        None => false,
    }
}

pub fn gfa_image_url(base: &str, region: &str, product: &str, period: &str) -> String {
    format!(
        "{}{}_{}_{}.gif",
        base,
        region.to_lowercase(),
        product.to_lowercase(),
        period
    )
}

// HEAD each candidate in order and keep the first that answers OK
pub(crate) async fn probe_first(
    client: &RemoteClient,
    period: &str,
    candidates: &[String],
) -> Option<DirectImage> {
    for url in candidates {
        match client.probe(url).await {
            Ok(probe) if probe.ok => {
                return Some(DirectImage {
                    period: period.to_string(),
                    url: url.clone(),
                    proxy_url: probe.proxy_url,
                    content_type: probe.content_type,
                });
            }
            Ok(probe) => debug!(url = %url, status = probe.status, "Image probe missed"),
            Err(e) => debug!(url = %url, error = %e, "Image probe failed"),
        }
    }
    None
}

pub struct GfaResolver {
    client: RemoteClient,
}

impl GfaResolver {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub async fn resolve(&self, site: &str, region: &str, image_code: &str) -> ImageResolution {
        let request = GfaRequest {
            site,
            region,
            image_code,
        };
        let mut last_error = None;

        for shape in GFA_QUERY_SHAPES {
            let pattern = shape(&request);
            let query = format!("{}&_={}", pattern, cache_buster());
            match self.client.get_json(&query).await {
                Ok(data) if is_gfa_shaped(&data) => {
                    info!(site = %site, region = %region, pattern = %pattern, "Resolved GFA through api");
                    return ImageResolution::Api {
                        payload: annotate(data, &pattern, region),
                        pattern: Some(pattern),
                    };
                }
                Ok(_) => debug!(pattern = %pattern, "GFA pattern returned no GFA data"),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "GFA pattern failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        ImageResolution::Direct {
            set: self.probe_direct(site, region, request.product()).await,
            api_error: last_error,
        }
    }

    // last resort: walk periods x candidate hosts
    pub async fn probe_direct(&self, site: &str, region: &str, product: &str) -> DirectImageSet {
        let product = product.to_lowercase();
        let mut images = Vec::new();

        for period in GFA_PERIODS {
            let candidates: Vec<String> = GFA_IMAGE_BASES
                .iter()
                .map(|base| gfa_image_url(base, region, &product, period))
                .collect();
            if let Some(image) = probe_first(&self.client, period, &candidates).await {
                images.push(image);
            }
        }

        info!(
            site = %site,
            region = %region,
            product = %product,
            found = images.len(),
            "Direct GFA probing finished"
        );

        DirectImageSet {
            kind: "direct_gfa_images".to_string(),
            gfa_region: Some(region.to_string()),
            site: site.to_string(),
            product,
            images,
        }
    }
}

fn annotate(data: Value, pattern: &str, region: &str) -> Value {
    match data {
        Value::Object(mut map) => {
            map.insert("gfa_pattern_used".to_string(), Value::String(pattern.to_string()));
            map.insert("gfa_region".to_string(), Value::String(region.to_string()));
            Value::Object(map)
        }
        other => other,
    }
}
