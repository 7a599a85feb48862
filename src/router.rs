use crate::config::{RouteTable, SiteConfig, canonical_origin};
use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyPath {
    NamedRoute { id: String, sub_path: String },
    DirectOrigin { origin: String, sub_path: String },
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub origin: String,
    pub sub_path: String,
    pub site: SiteConfig,
}

impl ResolvedRoute {
    pub fn target_url(&self, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.origin, self.sub_path, q),
            _ => format!("{}{}", self.origin, self.sub_path),
        }
    }
}

// Returns None when the path is not under the prefix at all
pub fn parse_proxy_path(path: &str, prefix: &str) -> Option<ProxyPath> {
    let rest = path.strip_prefix(prefix)?;
    // "/proxyfoo" is not under "/proxy"
    let rest = if prefix.is_empty() {
        rest.strip_prefix('/').unwrap_or(rest)
    } else {
        rest.strip_prefix('/')?
    };

    if rest.starts_with("http://") || rest.starts_with("https://") {
        return Some(parse_direct_origin(rest));
    }

    let (id, tail) = rest.split_once('/').unwrap_or((rest, ""));
    if id.is_empty() {
        return Some(ProxyPath::Invalid("missing route id".to_string()));
    }

    Some(ProxyPath::NamedRoute {
        id: id.to_string(),
        sub_path: format!("/{}", tail),
    })
}

fn parse_direct_origin(raw: &str) -> ProxyPath {
    let Some(scheme_end) = raw.find("://") else {
        return ProxyPath::Invalid(raw.to_string());
    };
    let authority_start = scheme_end + 3;
    let (origin, sub_path) = match raw[authority_start..].find('/') {
        Some(idx) => raw.split_at(authority_start + idx),
        None => (raw, ""),
    };

    let canonical = match reqwest::Url::parse(origin) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) && url.path() == "/" => {
            canonical_origin(&url)
        }
        _ => return ProxyPath::Invalid(origin.to_string()),
    };

    let sub_path = if sub_path.is_empty() { "/" } else { sub_path };
    ProxyPath::DirectOrigin {
        origin: canonical,
        sub_path: sub_path.to_string(),
    }
}

pub fn resolve(parsed: ProxyPath, routes: &RouteTable) -> Result<ResolvedRoute, ProxyError> {
    match parsed {
        ProxyPath::NamedRoute { id, sub_path } => {
            let site = routes
                .get(&id)
                .ok_or_else(|| ProxyError::RouteNotFound(id.clone()))?;
            Ok(ResolvedRoute {
                origin: site.base_origin.clone(),
                sub_path,
                site: site.clone(),
            })
        }
        ProxyPath::DirectOrigin { origin, sub_path } => {
            let site = routes
                .find_by_origin(&origin)
                .cloned()
                .unwrap_or_else(|| SiteConfig::for_origin(&origin));
            Ok(ResolvedRoute {
                origin,
                sub_path,
                site,
            })
        }
        ProxyPath::Invalid(reason) => Err(ProxyError::InvalidRoute(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::from_json(
            r#"[{"path":"openai","baseOrigin":"https://api.example.com","rateLimit":7}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_named_route() {
        let parsed = parse_proxy_path("/proxy/openai/v1/models", "/proxy").unwrap();
        assert_eq!(
            parsed,
            ProxyPath::NamedRoute {
                id: "openai".into(),
                sub_path: "/v1/models".into()
            }
        );

        let route = resolve(parsed, &table()).unwrap();
        assert_eq!(route.target_url(None), "https://api.example.com/v1/models");
        assert_eq!(route.site.rate_limit, 7);
    }

    #[test]
    fn test_named_route_empty_sub_path() {
        let parsed = parse_proxy_path("/proxy/openai", "/proxy").unwrap();
        assert_eq!(
            parsed,
            ProxyPath::NamedRoute {
                id: "openai".into(),
                sub_path: "/".into()
            }
        );
    }

    #[test]
    fn test_unknown_route() {
        let parsed = parse_proxy_path("/proxy/nope/v1", "/proxy").unwrap();
        let err = resolve(parsed, &table()).unwrap_err();
        assert!(matches!(err, ProxyError::RouteNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_direct_origin() {
        let parsed =
            parse_proxy_path("/proxy/https://api.example.com/v1/chat/completions", "/proxy")
                .unwrap();
        assert_eq!(
            parsed,
            ProxyPath::DirectOrigin {
                origin: "https://api.example.com".into(),
                sub_path: "/v1/chat/completions".into()
            }
        );
    }

    #[test]
    fn test_direct_origin_uses_matching_route_config() {
        let parsed = parse_proxy_path("/proxy/https://api.example.com/v1", "/proxy").unwrap();
        let route = resolve(parsed, &table()).unwrap();
        assert_eq!(route.site.rate_limit, 7);

        let parsed = parse_proxy_path("/proxy/http://localhost:8000", "/proxy").unwrap();
        let route = resolve(parsed, &table()).unwrap();
        assert_eq!(route.origin, "http://localhost:8000");
        assert_eq!(route.sub_path, "/");
        assert_eq!(route.site.rate_limit, 120);
    }

    #[test]
    fn test_direct_origin_aliases_share_identity() {
        let named = resolve(parse_proxy_path("/proxy/openai/v1", "/proxy").unwrap(), &table())
            .unwrap();

        for alias in [
            "/proxy/https://API.example.com/v1",
            "/proxy/https://api.example.com:443/v1",
            "/proxy/https://Api.Example.COM:443/v1",
        ] {
            let route = resolve(parse_proxy_path(alias, "/proxy").unwrap(), &table()).unwrap();
            assert_eq!(route.origin, named.origin, "{}", alias);
            assert_eq!(route.site, named.site, "{}", alias);
            assert_eq!(route.sub_path, "/v1");
        }

        // a non-default port is a different origin
        let other = parse_proxy_path("/proxy/https://api.example.com:8443/v1", "/proxy").unwrap();
        let route = resolve(other, &table()).unwrap();
        assert_eq!(route.origin, "https://api.example.com:8443");
        assert_eq!(route.site.rate_limit, 120);
    }

    #[test]
    fn test_direct_origin_malformed() {
        let parsed = parse_proxy_path("/proxy/https:///v1", "/proxy").unwrap();
        assert!(matches!(parsed, ProxyPath::Invalid(_)));
        assert!(matches!(
            resolve(parsed, &table()),
            Err(ProxyError::InvalidRoute(_))
        ));

        let parsed = parse_proxy_path("/proxy/https://bad host/v1", "/proxy").unwrap();
        assert!(matches!(parsed, ProxyPath::Invalid(_)));
    }

    #[test]
    fn test_outside_prefix() {
        assert!(parse_proxy_path("/other/openai", "/proxy").is_none());
        assert!(parse_proxy_path("/proxyfoo/openai", "/proxy").is_none());
        assert!(matches!(
            parse_proxy_path("/proxy/", "/proxy"),
            Some(ProxyPath::Invalid(_))
        ));
    }

    #[test]
    fn test_query_forwarded() {
        let parsed = parse_proxy_path("/proxy/openai/v1/models", "/proxy").unwrap();
        let route = resolve(parsed, &table()).unwrap();
        assert_eq!(
            route.target_url(Some("limit=5")),
            "https://api.example.com/v1/models?limit=5"
        );
    }
}
