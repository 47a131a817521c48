//! Shell preferences: sidebar, theme, language, page title and breadcrumbs.
//!
//! Sidebar, theme and language write through to `Storage` on every change
//! and are read back by `initialize`. A missing or unrecognized stored
//! value falls back to the default.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{keys, Storage};

pub const APP_TITLE: &str = "SynapseUI";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    /// Follow the system preference.
    Auto,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "en-US")]
    EnUs,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::ZhCn => "zh-CN",
            Language::EnUs => "en-US",
        }
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zh-CN" => Ok(Language::ZhCn),
            "en-US" => Ok(Language::EnUs),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Breadcrumb {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            path: None,
            icon: None,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }
}

pub struct AppStore {
    storage: Arc<dyn Storage>,
    sidebar_collapsed: bool,
    theme: Theme,
    language: Language,
    loading: bool,
    page_title: String,
    breadcrumbs: Vec<Breadcrumb>,
}

impl AppStore {
    /// A store holding defaults. Call `initialize` to load persisted values.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            sidebar_collapsed: false,
            theme: Theme::default(),
            language: Language::default(),
            loading: false,
            page_title: APP_TITLE.to_string(),
            breadcrumbs: Vec::new(),
        }
    }

    pub fn initialize(&mut self) {
        self.sidebar_collapsed = self.read(keys::SIDEBAR_COLLAPSED).and_then(|v| v.parse().ok()).unwrap_or(false);
        self.theme = self.read(keys::THEME).and_then(|v| v.parse().ok()).unwrap_or_default();
        self.language = self.read(keys::LANGUAGE).and_then(|v| v.parse().ok()).unwrap_or_default();
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.sidebar_collapsed
    }

    pub fn toggle_sidebar(&mut self) {
        self.set_sidebar_collapsed(!self.sidebar_collapsed);
    }

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) {
        self.sidebar_collapsed = collapsed;
        self.write(keys::SIDEBAR_COLLAPSED, if collapsed { "true" } else { "false" });
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Light goes dark; dark and auto both go light.
    pub fn toggle_theme(&mut self) {
        let next = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark | Theme::Auto => Theme::Light,
        };
        self.set_theme(next);
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.write(keys::THEME, theme.as_str());
    }

    /// `Auto` resolves against `system_prefers_dark`.
    pub fn is_dark(&self, system_prefers_dark: bool) -> bool {
        match self.theme {
            Theme::Dark => true,
            Theme::Light => false,
            Theme::Auto => system_prefers_dark,
        }
    }

    /// Always the opposite of `is_dark` for the same system preference.
    pub fn is_light(&self, system_prefers_dark: bool) -> bool {
        !self.is_dark(system_prefers_dark)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn toggle_language(&mut self) {
        let next = match self.language {
            Language::ZhCn => Language::EnUs,
            Language::EnUs => Language::ZhCn,
        };
        self.set_language(next);
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.write(keys::LANGUAGE, language.as_str());
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn page_title(&self) -> &str {
        &self.page_title
    }

    pub fn set_page_title(&mut self, title: &str) {
        self.page_title = title.to_string();
    }

    /// Window title for the current page.
    pub fn document_title(&self) -> String {
        format!("{} - {APP_TITLE}", self.page_title)
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.breadcrumbs
    }

    pub fn set_breadcrumbs(&mut self, breadcrumbs: Vec<Breadcrumb>) {
        self.breadcrumbs = breadcrumbs;
    }

    /// Back to defaults, forgetting every persisted preference.
    pub fn reset(&mut self) {
        let storage = Arc::clone(&self.storage);
        *self = Self::new(storage);
        for key in [keys::THEME, keys::LANGUAGE, keys::SIDEBAR_COLLAPSED] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to remove preference");
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "failed to read preference");
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(key, error = %e, "failed to persist preference");
        }
    }
}
