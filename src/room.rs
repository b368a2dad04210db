//! Room identification from the hosting page.

use crate::config::ClientConfig;

/// Opaque room identifier handed out by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        RoomCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Embedded page data wins; otherwise the code is taken from a
    /// `/room/<hex-id>` path.
    pub fn resolve(embedded: Option<&str>, path: &str) -> Option<Self> {
        embedded
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(RoomCode::new)
            .or_else(|| Self::from_path(path))
    }

    /// Extract the lowercase-hex id following the first `/room/` segment.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, rest) = path.split_once("/room/")?;
        let id: String = rest
            .chars()
            .take_while(|c| matches!(c, '0'..='9' | 'a'..='f'))
            .collect();
        (!id.is_empty()).then(|| RoomCode(id))
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The page address the client was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub secure: bool,
    pub host: String,
    pub path: String,
}

impl PageLocation {
    /// Parse an absolute `http(s)://host/path` page URL.
    pub fn parse(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        let secure = match scheme.to_ascii_lowercase().as_str() {
            "https" => true,
            "http" => false,
            _ => return None,
        };
        let (host, path) = match rest.find(['/', '?', '#']) {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return None;
        }
        let path = path.split(['?', '#']).next().unwrap_or_default();
        Some(PageLocation {
            secure,
            host: host.to_string(),
            path: if path.is_empty() { "/".into() } else { path.to_string() },
        })
    }

    /// Room code for this page, preferring embedded page data.
    pub fn room_code(&self, embedded: Option<&str>) -> Option<RoomCode> {
        RoomCode::resolve(embedded, &self.path)
    }

    /// Client config pointed at this page's origin, keeping `base`'s policy.
    pub fn client_config(&self, base: &ClientConfig) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            secure: self.secure,
            ..base.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_from_room_path() {
        assert_eq!(
            RoomCode::from_path("/room/ab12").map(|c| c.to_string()),
            Some("ab12".to_string())
        );
        assert_eq!(
            RoomCode::from_path("/room/00ff/lobby").unwrap().as_str(),
            "00ff"
        );
    }

    #[test]
    fn non_hex_path_has_no_code() {
        assert!(RoomCode::from_path("/room/").is_none());
        assert!(RoomCode::from_path("/room/XYZ").is_none());
        assert!(RoomCode::from_path("/lobby").is_none());
    }

    #[test]
    fn embedded_code_wins() {
        let code = RoomCode::resolve(Some("zz-9"), "/room/ab12").unwrap();
        assert_eq!(code.as_str(), "zz-9");
        let code = RoomCode::resolve(Some("  "), "/room/ab12").unwrap();
        assert_eq!(code.as_str(), "ab12");
        assert!(RoomCode::resolve(None, "/").is_none());
    }

    #[test]
    fn page_location_parses() {
        let page = PageLocation::parse("https://play.example.com:8443/room/ab12?x=1").unwrap();
        assert!(page.secure);
        assert_eq!(page.host, "play.example.com:8443");
        assert_eq!(page.path, "/room/ab12");
        assert_eq!(page.room_code(None).unwrap().as_str(), "ab12");

        let config = page.client_config(&ClientConfig::default());
        assert_eq!(
            config.ws_url(page.room_code(None).unwrap().as_str()),
            "wss://play.example.com:8443/ws?room=ab12"
        );
    }

    #[test]
    fn page_location_rejects_other_schemes() {
        assert!(PageLocation::parse("ftp://host/room/ab").is_none());
        assert!(PageLocation::parse("host/room/ab").is_none());
        assert!(PageLocation::parse("http:///room/ab").is_none());
        assert_eq!(PageLocation::parse("http://host").unwrap().path, "/");
    }
}
