//! URL construction for the site, tracker, and API endpoints.

use btnd_model::TorrentEntry;
use url::Url;

const DEFAULT_API_ENDPOINT: &str = "https://api.broadcasthe.net/";
const DEFAULT_SITE_BASE: &str = "https://broadcasthe.net/";
const DEFAULT_TRACKER_BASE: &str = "https://landof.tv/";

/// Base URLs for the remote's surfaces. Overridable for tests.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    api_endpoint: Url,
    site_base: Url,
    tracker_base: Url,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            api_endpoint: Url::parse(DEFAULT_API_ENDPOINT).expect("static url"),
            site_base: Url::parse(DEFAULT_SITE_BASE).expect("static url"),
            tracker_base: Url::parse(DEFAULT_TRACKER_BASE).expect("static url"),
        }
    }
}

impl SiteUrls {
    /// Explicit bases, typically pointing at a mock server under test.
    #[must_use]
    pub const fn new(api_endpoint: Url, site_base: Url, tracker_base: Url) -> Self {
        Self {
            api_endpoint,
            site_base,
            tracker_base,
        }
    }

    /// The JSON-RPC endpoint.
    #[must_use]
    pub const fn api_endpoint(&self) -> &Url {
        &self.api_endpoint
    }

    /// The authenticated metafile download URL for a torrent id.
    #[must_use]
    pub fn download_url(&self, authkey: &str, passkey: &str, id: i64) -> Url {
        let mut url = self.site_base.clone();
        url.set_path("/torrents.php");
        url.query_pairs_mut()
            .append_pair("action", "download")
            .append_pair("authkey", authkey)
            .append_pair("torrent_pass", passkey)
            .append_pair("id", &id.to_string());
        url
    }

    /// The recent-uploads feed URL for the configured account.
    #[must_use]
    pub fn feed_url(&self, user: i64, auth: &str, passkey: &str, authkey: &str) -> Url {
        let mut url = self.site_base.clone();
        url.set_path("/feeds.php");
        url.query_pairs_mut()
            .append_pair("feed", "torrents_all")
            .append_pair("user", &user.to_string())
            .append_pair("auth", auth)
            .append_pair("passkey", passkey)
            .append_pair("authkey", authkey);
        url
    }

    /// Announce URLs derived from the account's passkey.
    #[must_use]
    pub fn announce_urls(&self, passkey: &str) -> Vec<String> {
        let mut url = self.tracker_base.clone();
        url.set_path(&format!("{passkey}/announce"));
        vec![url.to_string()]
    }

    /// A magnet URI for a cached entry. Only the `as` (acceptable
    /// source) parameter is percent-encoded, matching what the site's
    /// own clients emit.
    #[must_use]
    pub fn magnet_link(&self, entry: &TorrentEntry, passkey: &str, link: Option<&str>) -> String {
        let mut pairs: Vec<(String, String)> = vec![
            ("dn".to_string(), entry.release_name.clone()),
            ("xt".to_string(), format!("urn:btih:{}", entry.info_hash)),
            ("xl".to_string(), entry.size.to_string()),
        ];
        for tracker in self.announce_urls(passkey) {
            pairs.push(("tr".to_string(), tracker));
        }
        if let Some(link) = link {
            let encoded: String = url::form_urlencoded::byte_serialize(link.as_bytes()).collect();
            pairs.push(("as".to_string(), encoded));
        }
        let query: Vec<String> = pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("magnet:?{}", query.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btnd_test_support::sample_torrent;

    #[test]
    fn download_url_carries_credentials() {
        let urls = SiteUrls::default();
        let url = urls.download_url("AUTH", "PASS", 123);
        assert_eq!(url.host_str(), Some("broadcasthe.net"));
        assert_eq!(url.path(), "/torrents.php");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        assert!(query.contains(&("action".to_string(), "download".to_string())));
        assert!(query.contains(&("authkey".to_string(), "AUTH".to_string())));
        assert!(query.contains(&("torrent_pass".to_string(), "PASS".to_string())));
        assert!(query.contains(&("id".to_string(), "123".to_string())));
    }

    #[test]
    fn announce_url_embeds_passkey() {
        let urls = SiteUrls::default();
        assert_eq!(
            urls.announce_urls("abc123"),
            vec!["https://landof.tv/abc123/announce".to_string()]
        );
    }

    #[test]
    fn magnet_link_encodes_only_the_source_link() {
        let urls = SiteUrls::default();
        let row = sample_torrent(9);
        let magnet = urls.magnet_link(&row.entry, "abc", Some("https://x/y?z=1"));
        assert!(magnet.starts_with("magnet:?dn=Release.9&xt=urn:btih:"));
        assert!(magnet.contains("&xl=1009&"));
        assert!(magnet.contains("&tr=https://landof.tv/abc/announce"));
        assert!(magnet.ends_with("&as=https%3A%2F%2Fx%2Fy%3Fz%3D1"));
    }

    #[test]
    fn feed_url_names_the_all_torrents_feed() {
        let urls = SiteUrls::default();
        let url = urls.feed_url(7, "a", "p", "k");
        assert_eq!(url.path(), "/feeds.php");
        assert!(url.query().expect("query").contains("feed=torrents_all"));
        assert!(url.query().expect("query").contains("user=7"));
    }
}
