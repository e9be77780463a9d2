//! Browser detection and install guidance.

use std::path::PathBuf;

/// Chromium-family executable names searched on `PATH`.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "chromium",
    "chromium-browser",
    "microsoft-edge",
    "microsoft-edge-stable",
    "msedge",
    "brave-browser",
];

/// Well-known install locations, checked before `PATH` because `PATH` can
/// hold broken wrapper scripts.
#[cfg(target_os = "linux")]
const PLATFORM_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(target_os = "macos")]
const PLATFORM_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const PLATFORM_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const PLATFORM_PATHS: &[&str] = &[];

/// Where a browser binary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Config,
    Environment,
    PlatformPath,
    SearchPath,
}

/// Result of browser detection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Path to the browser executable, if found.
    pub path: Option<PathBuf>,
    pub source: Option<DetectionSource>,
    /// Platform-specific install instructions (empty when found).
    pub install_hint: String,
}

impl DetectionResult {
    #[must_use]
    pub fn found(&self) -> bool {
        self.path.is_some()
    }

    fn hit(path: PathBuf, source: DetectionSource) -> Self {
        Self {
            path: Some(path),
            source: Some(source),
            install_hint: String::new(),
        }
    }
}

/// Detect a Chromium-based browser.
///
/// Checks, in order: the configured path, the `CHROME` environment
/// variable, platform install paths, then executable names on `PATH`.
pub fn detect_browser(custom_path: Option<&str>) -> DetectionResult {
    detect_with(custom_path, std::env::var("CHROME").ok())
}

fn detect_with(custom_path: Option<&str>, env_path: Option<String>) -> DetectionResult {
    if let Some(p) = custom_path.map(PathBuf::from).filter(|p| p.exists()) {
        return DetectionResult::hit(p, DetectionSource::Config);
    }

    if let Some(p) = env_path.map(PathBuf::from).filter(|p| p.exists()) {
        return DetectionResult::hit(p, DetectionSource::Environment);
    }

    if let Some(p) = PLATFORM_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
        return DetectionResult::hit(p, DetectionSource::PlatformPath);
    }

    if let Some(p) = CHROMIUM_EXECUTABLES
        .iter()
        .find_map(|name| which::which(name).ok())
    {
        return DetectionResult::hit(p, DetectionSource::SearchPath);
    }

    DetectionResult {
        path: None,
        source: None,
        install_hint: install_instructions(),
    }
}

/// Get platform-specific install instructions.
pub fn install_instructions() -> String {
    let instructions = if cfg!(target_os = "macos") {
        "  brew install --cask google-chrome"
    } else if cfg!(target_os = "linux") {
        "  Debian/Ubuntu: sudo apt install chromium\n  \
         Fedora:        sudo dnf install chromium\n  \
         Docker images: install google-chrome-stable and run with --disable-dev-shm-usage"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else {
        "  Download from https://www.google.com/chrome/"
    };

    format!(
        "No Chromium-based browser found. Install one:\n\n\
         {instructions}\n\n\
         Or set the path manually:\n  \
         [browser]\n  \
         chrome_path = \"/path/to/chrome\"\n\n\
         Or set the CHROME (or CHAINSCOPE_CHROME_PATH) environment variable."
    )
}
