//! Social/contact link extraction from a descriptor's free-text description.
//!
//! Every `http(s)` URL in the text is classified in order of appearance:
//! twitter/x profile, telegram invite, or generic website (anything matching
//! neither of the first two). The first URL of each category wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::SocialLinks;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("Invalid URL regex"));

static TWITTER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(www\.)?(x|twitter)\.com/\S+").expect("Invalid twitter regex")
});

static TELEGRAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(www\.)?t\.me/\S+").expect("Invalid telegram regex")
});

/// Characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '"', '\''];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Twitter,
    Telegram,
    Website,
}

/// Classify a single URL.
pub fn classify(url: &str) -> LinkKind {
    if TWITTER_REGEX.is_match(url) {
        LinkKind::Twitter
    } else if TELEGRAM_REGEX.is_match(url) {
        LinkKind::Telegram
    } else {
        LinkKind::Website
    }
}

/// All URLs in `text`, in order, with trailing sentence punctuation removed.
pub fn find_urls(text: &str) -> impl Iterator<Item = &str> {
    URL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|url| !url.ends_with("://"))
}

/// Extract at most one link per category from `description`.
pub fn extract_links(description: &str) -> SocialLinks {
    let mut links = SocialLinks::default();
    for url in find_urls(description) {
        let slot = match classify(url) {
            LinkKind::Twitter => &mut links.twitter,
            LinkKind::Telegram => &mut links.telegram,
            LinkKind::Website => &mut links.website,
        };
        if slot.is_none() {
            *slot = Some(url.to_string());
        }
        if links.twitter.is_some() && links.telegram.is_some() && links.website.is_some() {
            break;
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_link_per_category() {
        let links =
            extract_links("see https://x.com/foo and https://t.me/foo and https://foo.io");
        assert_eq!(links.twitter.as_deref(), Some("https://x.com/foo"));
        assert_eq!(links.telegram.as_deref(), Some("https://t.me/foo"));
        assert_eq!(links.website.as_deref(), Some("https://foo.io"));
    }

    #[test]
    fn twitter_domain_is_recognised() {
        let links = extract_links("follow https://twitter.com/foo_sol");
        assert_eq!(links.twitter.as_deref(), Some("https://twitter.com/foo_sol"));
        assert!(links.website.is_none());
    }

    #[test]
    fn first_occurrence_wins() {
        let links = extract_links(
            "https://x.com/first https://x.com/second https://a.io https://b.io",
        );
        assert_eq!(links.twitter.as_deref(), Some("https://x.com/first"));
        assert_eq!(links.website.as_deref(), Some("https://a.io"));
    }

    #[test]
    fn website_excludes_social_domains_regardless_of_order() {
        let links = extract_links("https://t.me/chat then https://x.com/acct then http://site.xyz/");
        assert_eq!(links.website.as_deref(), Some("http://site.xyz/"));
    }

    #[test]
    fn website_may_contain_letter_x() {
        // Hosts containing "x" are still plain websites.
        let links = extract_links("docs at https://example.xyz/whitepaper");
        assert_eq!(links.website.as_deref(), Some("https://example.xyz/whitepaper"));
        assert!(links.twitter.is_none());
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_link() {
        let links = extract_links("Join us (https://t.me/foo). Site: https://foo.io.");
        assert_eq!(links.telegram.as_deref(), Some("https://t.me/foo"));
        assert_eq!(links.website.as_deref(), Some("https://foo.io"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let links = extract_links("HTTPS://X.COM/Foo");
        assert_eq!(links.twitter.as_deref(), Some("HTTPS://X.COM/Foo"));
    }

    #[test]
    fn bare_domain_without_path_is_a_website() {
        assert_eq!(classify("https://x.com"), LinkKind::Website);
        assert_eq!(classify("https://x.com/a"), LinkKind::Twitter);
    }

    #[test]
    fn no_links_in_plain_text() {
        assert_eq!(extract_links("just a meme coin"), SocialLinks::default());
        assert_eq!(extract_links(""), SocialLinks::default());
    }
}
