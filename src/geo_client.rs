use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::configuration::GeoSettings;
use crate::session::RequestMeta;

/// Client for the ipinfo.io lookup API.
///
/// Lookups are audit-only enrichment: a failed or slow upstream must never
/// fail the request that triggered it, so `lookup` is infallible and degrades
/// to placeholder metadata. Successful lookups are cached per IP with a TTL.
#[derive(Clone)]
pub struct GeoClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cache: Arc<Mutex<HashMap<String, (RequestMeta, Instant)>>>,
    cache_ttl: Duration,
}

#[derive(Deserialize)]
struct IpinfoPayload {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    org: Option<String>,
}

impl GeoClient {
    pub fn new(settings: &GeoSettings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.clone(),
            token: settings.token.clone(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            cache_ttl: Duration::from_secs(settings.cache_ttl_secs),
        }
    }

    /// Resolve geolocation metadata for an IP address.
    ///
    /// Private and loopback addresses short-circuit without a network call.
    /// Upstream failures log a warning and return the "Unknown" placeholder.
    pub async fn lookup(&self, ip: &str) -> RequestMeta {
        if is_private_ip(ip) {
            return RequestMeta {
                ip: Some(ip.to_string()),
                country: Some("Local Network".to_string()),
                country_code: Some("LN".to_string()),
                city: Some("Local".to_string()),
                isp: Some("Private Network".to_string()),
                latitude: None,
                longitude: None,
            };
        }

        if let Some(cached) = self.cached(ip) {
            return cached;
        }

        match self.fetch(ip).await {
            Ok(meta) => {
                self.cache
                    .lock()
                    .unwrap()
                    .insert(ip.to_string(), (meta.clone(), Instant::now()));
                meta
            }
            Err(e) => {
                tracing::warn!(ip = %ip, "Geolocation lookup failed: {}", e);
                RequestMeta {
                    ip: Some(ip.to_string()),
                    country: Some("Unknown".to_string()),
                    country_code: Some("XX".to_string()),
                    city: Some("Unknown".to_string()),
                    isp: Some("Unknown ISP".to_string()),
                    latitude: None,
                    longitude: None,
                }
            }
        }
    }

    fn cached(&self, ip: &str) -> Option<RequestMeta> {
        let cache = self.cache.lock().unwrap();
        cache.get(ip).and_then(|(meta, stored_at)| {
            if stored_at.elapsed() < self.cache_ttl {
                Some(meta.clone())
            } else {
                None
            }
        })
    }

    async fn fetch(&self, ip: &str) -> Result<RequestMeta, reqwest::Error> {
        let url = match &self.token {
            Some(token) => format!("{}/{}/json?token={}", self.base_url, ip, token),
            None => format!("{}/{}/json", self.base_url, ip),
        };

        let payload = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpinfoPayload>()
            .await?;

        let country_code = payload.country.unwrap_or_else(|| "XX".to_string());
        let (latitude, longitude) = payload
            .loc
            .as_deref()
            .and_then(parse_loc)
            .map_or((None, None), |(lat, lon)| (Some(lat), Some(lon)));

        Ok(RequestMeta {
            ip: Some(ip.to_string()),
            country: Some(country_name(&country_code).to_string()),
            country_code: Some(country_code),
            city: Some(payload.city.unwrap_or_else(|| "Unknown".to_string())),
            isp: Some(parse_isp(payload.org.as_deref())),
            latitude,
            longitude,
        })
    }
}

fn is_private_ip(ip: &str) -> bool {
    if ip == "127.0.0.1"
        || ip == "localhost"
        || ip.starts_with("192.168.")
        || ip.starts_with("10.0.")
    {
        return true;
    }
    // 172.16.0.0/12
    if let Some(rest) = ip.strip_prefix("172.") {
        if let Some((octet, _)) = rest.split_once('.') {
            if let Ok(n) = octet.parse::<u8>() {
                return (16..=31).contains(&n);
            }
        }
    }
    false
}

/// ipinfo reports `org` as "AS15169 Google LLC"; strip the ASN prefix.
fn parse_isp(org: Option<&str>) -> String {
    let org = match org {
        Some(o) if !o.is_empty() => o,
        _ => return "Unknown ISP".to_string(),
    };

    if org.starts_with("AS") {
        if let Some((_, name)) = org.split_once(' ') {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    org.to_string()
}

fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lon = lon.trim().parse::<f64>().ok()?;
    Some((lat, lon))
}

fn country_name(code: &str) -> &str {
    match code {
        "NL" => "Netherlands",
        "PL" => "Poland",
        "SG" => "Singapore",
        "US" => "United States",
        "JP" => "Japan",
        "RO" => "Romania",
        "ET" => "Ethiopia",
        "GB" => "United Kingdom",
        "CA" => "Canada",
        "DE" => "Germany",
        "FR" => "France",
        "CN" => "China",
        "IN" => "India",
        "BR" => "Brazil",
        "RU" => "Russia",
        "AU" => "Australia",
        "ZA" => "South Africa",
        "NG" => "Nigeria",
        "KE" => "Kenya",
        "EG" => "Egypt",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GeoClient {
        let settings = GeoSettings {
            enabled: true,
            base_url: "https://ipinfo.invalid".to_string(),
            token: None,
            cache_ttl_secs: 3600,
            timeout_secs: 3,
        };
        GeoClient::new(&settings, reqwest::Client::new())
    }

    #[test]
    fn test_private_ip_detection() {
        assert!(is_private_ip("127.0.0.1"));
        assert!(is_private_ip("localhost"));
        assert!(is_private_ip("192.168.1.10"));
        assert!(is_private_ip("10.0.0.5"));
        assert!(is_private_ip("172.16.0.1"));
        assert!(is_private_ip("172.31.255.255"));

        assert!(!is_private_ip("172.32.0.1"));
        assert!(!is_private_ip("8.8.8.8"));
        assert!(!is_private_ip("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_private_ip_resolves_without_network() {
        let client = test_client();
        let meta = client.lookup("192.168.0.42").await;

        assert_eq!(meta.country.as_deref(), Some("Local Network"));
        assert_eq!(meta.country_code.as_deref(), Some("LN"));
        assert_eq!(meta.city.as_deref(), Some("Local"));
        assert_eq!(meta.isp.as_deref(), Some("Private Network"));
        assert!(meta.latitude.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_degrades_to_unknown() {
        // .invalid never resolves, so the fetch fails fast
        let client = test_client();
        let meta = client.lookup("203.0.113.7").await;

        assert_eq!(meta.country.as_deref(), Some("Unknown"));
        assert_eq!(meta.country_code.as_deref(), Some("XX"));
        assert_eq!(meta.isp.as_deref(), Some("Unknown ISP"));
    }

    #[test]
    fn test_isp_parsing_strips_asn_prefix() {
        assert_eq!(parse_isp(Some("AS15169 Google LLC")), "Google LLC");
        assert_eq!(parse_isp(Some("Comcast Cable")), "Comcast Cable");
        assert_eq!(parse_isp(Some("AS396982")), "AS396982");
        assert_eq!(parse_isp(Some("")), "Unknown ISP");
        assert_eq!(parse_isp(None), "Unknown ISP");
    }

    #[test]
    fn test_loc_parsing() {
        assert_eq!(parse_loc("37.3860,-122.0838"), Some((37.3860, -122.0838)));
        assert_eq!(parse_loc(" 52.37 , 4.89 "), Some((52.37, 4.89)));
        assert_eq!(parse_loc("not-a-loc"), None);
        assert_eq!(parse_loc("12.3"), None);
    }

    #[test]
    fn test_country_name_mapping() {
        assert_eq!(country_name("NL"), "Netherlands");
        assert_eq!(country_name("US"), "United States");
        assert_eq!(country_name("QQ"), "QQ");
    }
}
