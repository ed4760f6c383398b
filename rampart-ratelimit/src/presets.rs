//! Preset policies keyed by request path.

use crate::config::{RateLimitConfig, WindowConfig};
use crate::extractor::KeyExtractor;
use std::time::Duration;

/// Named rate limit policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Authentication, OAuth and integration handshakes: 10 per 15 minutes
    Strict,
    /// Regular API traffic: 60 per minute
    Standard,
    /// Health checks, webhooks and tracking pixels: 300 per minute
    Lenient,
    /// Authenticated API traffic keyed by user: 120 per minute
    PerUser,
    /// Expensive AI and generation endpoints: 10 per minute
    Elevated,
}

const STRICT_PREFIXES: &[&str] = &["/auth/", "/email/oauth/", "/demo/"];
const INTEGRATION_ACTIONS: &[&str] = &["/callback", "/authorize", "/connect"];
const ELEVATED_MARKERS: &[&str] = &["/ai/", "/agents/", "/generate", "/analyze", "/regenerate"];
const LENIENT_MARKERS: &[&str] = &["/health", "/webhook", "/pixel/"];

impl Preset {
    /// All presets
    pub const ALL: [Preset; 5] = [
        Preset::Strict,
        Preset::Standard,
        Preset::Lenient,
        Preset::PerUser,
        Preset::Elevated,
    ];

    /// Short name, also used as the storage key prefix
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Lenient => "lenient",
            Self::PerUser => "per-user",
            Self::Elevated => "elevated",
        }
    }

    /// Window and ceiling for this preset
    pub fn window(&self) -> WindowConfig {
        match self {
            Self::Strict => WindowConfig::new(10, Duration::from_secs(15 * 60)),
            Self::Standard => WindowConfig::new(60, Duration::from_secs(60)),
            Self::Lenient => WindowConfig::new(300, Duration::from_secs(60)),
            Self::PerUser => WindowConfig::new(120, Duration::from_secs(60)),
            Self::Elevated => WindowConfig::new(10, Duration::from_secs(60)),
        }
    }

    /// Key extractor for this preset
    pub fn extractor(&self) -> KeyExtractor {
        match self {
            Self::PerUser => KeyExtractor::UserId,
            _ => KeyExtractor::ForwardedIp,
        }
    }

    /// Full limiter configuration, prefixing keys with the preset name so
    /// presets sharing a store never share counters.
    pub fn config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: self.window(),
            key_prefix: Some(self.name().to_string()),
            extractor: self.extractor(),
        }
    }

    /// Choose a preset for a request path.
    ///
    /// Checked in order: strict, elevated, lenient, then standard for
    /// everything else.
    pub fn for_path(path: &str) -> Preset {
        if is_strict(path) {
            Preset::Strict
        } else if ELEVATED_MARKERS.iter().any(|m| path.contains(m)) {
            Preset::Elevated
        } else if LENIENT_MARKERS.iter().any(|m| path.contains(m)) {
            Preset::Lenient
        } else {
            Preset::Standard
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Preset {
    type Err = crate::RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s) || (s.eq_ignore_ascii_case("per_user") && *p == Preset::PerUser))
            .ok_or_else(|| crate::RateLimitError::config(format!("unknown preset '{s}'")))
    }
}

fn is_strict(path: &str) -> bool {
    if STRICT_PREFIXES.iter().any(|p| path.contains(p)) {
        return true;
    }
    // `/integrations/<anything>/callback` and friends.
    path.match_indices("/integrations/").any(|(at, marker)| {
        let rest = &path[at + marker.len()..];
        INTEGRATION_ACTIONS.iter().any(|action| rest.contains(action))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_paths() {
        for path in [
            "/api/auth/login",
            "/api/email/oauth/google",
            "/api/integrations/slack/callback",
            "/api/integrations/github/app/authorize",
            "/api/integrations/x/connect",
            "/api/demo/start",
        ] {
            assert_eq!(Preset::for_path(path), Preset::Strict, "{path}");
        }
    }

    #[test]
    fn test_priority_order() {
        // Matches both strict and elevated markers.
        assert_eq!(Preset::for_path("/api/auth/ai/session"), Preset::Strict);
        // Matches both elevated and lenient markers.
        assert_eq!(Preset::for_path("/api/ai/health"), Preset::Elevated);
        assert_eq!(Preset::for_path("/api/webhook/stripe"), Preset::Lenient);
        assert_eq!(Preset::for_path("/api/health"), Preset::Lenient);
        assert_eq!(Preset::for_path("/api/content/generate"), Preset::Elevated);
        assert_eq!(Preset::for_path("/api/contacts"), Preset::Standard);
        assert_eq!(Preset::for_path("/api/integrations/slack/status"), Preset::Standard);
    }

    #[test]
    fn test_preset_values() {
        assert_eq!(Preset::Strict.window(), WindowConfig::new(10, Duration::from_secs(900)));
        assert_eq!(Preset::Standard.window(), WindowConfig::new(60, Duration::from_secs(60)));
        assert_eq!(Preset::Lenient.window().max_requests, 300);
        assert_eq!(Preset::PerUser.window().max_requests, 120);
        assert_eq!(Preset::Elevated.window().max_requests, 10);
        assert!(matches!(Preset::PerUser.extractor(), KeyExtractor::UserId));

        for preset in Preset::ALL {
            let config = preset.config();
            assert!(config.validate().is_ok());
            assert_eq!(config.key_prefix.as_deref(), Some(preset.name()));
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("strict".parse::<Preset>().unwrap(), Preset::Strict);
        assert_eq!("Per-User".parse::<Preset>().unwrap(), Preset::PerUser);
        assert_eq!("per_user".parse::<Preset>().unwrap(), Preset::PerUser);
        assert!("nope".parse::<Preset>().is_err());
    }
}
