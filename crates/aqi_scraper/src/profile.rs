//! Randomized browser fingerprints.
//!
//! Each attempt draws a fresh profile from small fixed pools so consecutive
//! attempts are not trivially linkable. This lowers the automation signal;
//! it does not make the browser undetectable.

use rand::seq::SliceRandom;
use rand::Rng;

const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

const LOCALES: &[&str] = &["en-IN", "en-US", "en-GB", "hi-IN"];

/// Points in and around Delhi NCR.
const GEOLOCATIONS: &[(f64, f64)] = &[
    (28.6139, 77.2090),
    (28.7041, 77.1025),
    (28.5355, 77.3910),
    (28.4595, 77.0266),
];

const TIMEZONE: &str = "Asia/Kolkata";

const WEBGL_VENDORS: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce GTX 1650 Direct3D11 vs_5_0 ps_5_0)"),
    ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0)"),
];

/// Fingerprint applied to one browsing context.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserProfile {
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub locale: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}

impl BrowserProfile {
    /// Draw a profile from the fixed pools.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let viewport = *VIEWPORTS.choose(rng).unwrap_or(&VIEWPORTS[0]);
        let user_agent = USER_AGENTS.choose(rng).unwrap_or(&USER_AGENTS[0]);
        let locale = LOCALES.choose(rng).unwrap_or(&LOCALES[0]);
        let (latitude, longitude) = *GEOLOCATIONS.choose(rng).unwrap_or(&GEOLOCATIONS[0]);
        let (vendor, renderer) = *WEBGL_VENDORS.choose(rng).unwrap_or(&WEBGL_VENDORS[0]);

        Self {
            viewport,
            user_agent: (*user_agent).to_string(),
            locale: (*locale).to_string(),
            timezone: TIMEZONE.to_string(),
            latitude,
            longitude,
            webgl_vendor: vendor.to_string(),
            webgl_renderer: renderer.to_string(),
        }
    }

    /// `navigator.languages` for this locale, most specific first.
    pub fn languages(&self) -> Vec<String> {
        let mut langs = vec![self.locale.clone()];
        if let Some((base, _)) = self.locale.split_once('-') {
            langs.push(base.to_string());
        }
        if !langs.iter().any(|l| l == "en") {
            langs.push("en".into());
        }
        langs
    }

    /// Platform string consistent with the chosen user agent.
    pub fn platform(&self) -> &'static str {
        if self.user_agent.contains("Macintosh") {
            "MacIntel"
        } else if self.user_agent.contains("Linux") {
            "Linux x86_64"
        } else {
            "Win32"
        }
    }
}
