//! Request classification and cache admission rules.

use crate::config::WorkerConfig;
use crate::http::{Request, Response, ResponseType};

/// How an intercepted request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Live data: network first, cache as fallback.
    NetworkFirst,
    /// Static assets: cache first, network on miss.
    CacheFirst,
    /// Not cacheable (non-GET): straight to network.
    Passthrough,
}

/// Pick a strategy from the request URL and method.
pub fn classify(request: &Request, config: &WorkerConfig) -> FetchStrategy {
    if request.method != "GET" {
        return FetchStrategy::Passthrough;
    }
    if is_dynamic(request, config) {
        FetchStrategy::NetworkFirst
    } else {
        FetchStrategy::CacheFirst
    }
}

/// Host names a remote-data domain, or the path carries the API marker.
pub fn is_dynamic(request: &Request, config: &WorkerConfig) -> bool {
    let host_match = request
        .url
        .host_str()
        .map(|host| config.dynamic_hosts.iter().any(|d| host.contains(d.as_str())))
        .unwrap_or(false);
    host_match || request.url.path().contains(&config.api_marker)
}

/// Whether a network response for a static miss may be stored.
///
/// Only plain same-origin 200s qualify.
pub fn admits_static(response: &Response) -> bool {
    response.status == 200 && response.response_type == ResponseType::Basic && !response.redirected
}

/// Whether a network-first response may refresh the cache.
///
/// Any response the network delivered counts, error statuses included.
pub fn admits_dynamic(response: &Response) -> bool {
    response.response_type != ResponseType::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str) -> Request {
        Request::parse_get(url).unwrap()
    }

    #[test]
    fn test_api_host_is_network_first() {
        let config = WorkerConfig::default();
        assert_eq!(
            classify(&req("https://api.cricapi.com/v1/currentMatches"), &config),
            FetchStrategy::NetworkFirst
        );
    }

    #[test]
    fn test_api_path_is_network_first() {
        let config = WorkerConfig::default();
        assert_eq!(
            classify(&req("https://wicket.live/api/scores"), &config),
            FetchStrategy::NetworkFirst
        );
    }

    #[test]
    fn test_assets_are_cache_first() {
        let config = WorkerConfig::default();
        for url in [
            "https://wicket.live/",
            "https://wicket.live/static/js/bundle.js",
            "https://fonts.example.com/api.css",
        ] {
            assert_eq!(classify(&req(url), &config), FetchStrategy::CacheFirst, "{}", url);
        }
    }

    #[test]
    fn test_non_get_passthrough() {
        let config = WorkerConfig::default();
        let post = req("https://wicket.live/api/vote").with_method("POST");
        assert_eq!(classify(&post, &config), FetchStrategy::Passthrough);
    }

    #[test]
    fn test_static_admission() {
        assert!(admits_static(&Response::new(200, "")));
        assert!(!admits_static(&Response::new(404, "")));
        assert!(!admits_static(&Response::new(206, "")));
        assert!(!admits_static(&Response::new(200, "").with_type(ResponseType::Cors)));
        assert!(!admits_static(&Response::new(200, "").with_type(ResponseType::Opaque)));
        assert!(!admits_static(&Response::new(200, "").redirected()));
    }

    #[test]
    fn test_dynamic_admission() {
        assert!(admits_dynamic(&Response::new(200, "").with_type(ResponseType::Cors)));
        assert!(admits_dynamic(&Response::new(503, "")));
        assert!(!admits_dynamic(&Response::network_error()));
    }
}
