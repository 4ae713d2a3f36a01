//! Locale negotiation: an ordered fallback chain of lazily-built bundles.
//!
//! The orchestrator owns a locale list, a set of resource ids, and a
//! [`ResourceLoader`] — its only coupling to the filesystem. Bundles are
//! constructed on first use per locale, under a mutex. `format_value`
//! walks the chain and returns the first resolution that found its
//! message; when every locale misses, the last bundle's fallback (or the
//! braced id) comes back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use thiserror::Error;

use crate::bundle::{BundleConfig, FluentBundle, FormatError};
use crate::error::{DiagnosticCode, FluentError};
use crate::value::FluentArgs;

#[derive(Debug, Clone, Error)]
pub enum ResourceLoaderError {
    #[error("resource {resource_id} not found for locale {locale}")]
    NotFound { locale: String, resource_id: String },
    #[error("failed to read {resource_id} for locale {locale}: {message}")]
    Io {
        locale: String,
        resource_id: String,
        message: String,
    },
}

/// Source of FTL text for `(locale, resource_id)` pairs.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, locale: &str, resource_id: &str) -> Result<String, ResourceLoaderError>;
}

/// Loads `<root>/<locale>/<resource_id>` from disk.
pub struct FileResourceLoader {
    root: PathBuf,
}

impl FileResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLoader for FileResourceLoader {
    fn load(&self, locale: &str, resource_id: &str) -> Result<String, ResourceLoaderError> {
        let path = self.root.join(locale).join(resource_id);
        std::fs::read_to_string(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ResourceLoaderError::NotFound {
                locale: locale.to_string(),
                resource_id: resource_id.to_string(),
            },
            _ => ResourceLoaderError::Io {
                locale: locale.to_string(),
                resource_id: resource_id.to_string(),
                message: err.to_string(),
            },
        })
    }
}

/// In-memory loader, handy for tests and embedded resources.
#[derive(Default)]
pub struct StaticResourceLoader {
    resources: HashMap<(String, String), String>,
}

impl StaticResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, locale: &str, resource_id: &str, source: &str) -> Self {
        self.resources.insert(
            (locale.to_string(), resource_id.to_string()),
            source.to_string(),
        );
        self
    }
}

impl ResourceLoader for StaticResourceLoader {
    fn load(&self, locale: &str, resource_id: &str) -> Result<String, ResourceLoaderError> {
        self.resources
            .get(&(locale.to_string(), resource_id.to_string()))
            .cloned()
            .ok_or_else(|| ResourceLoaderError::NotFound {
                locale: locale.to_string(),
                resource_id: resource_id.to_string(),
            })
    }
}

/// Multi-locale fallback front end over per-locale bundles.
pub struct Localization {
    locales: Vec<String>,
    resource_ids: Vec<String>,
    loader: Box<dyn ResourceLoader>,
    config_template: BundleConfig,
    bundles: Mutex<HashMap<String, Arc<FluentBundle>>>,
}

impl Localization {
    /// `locales` is the fallback chain in preference order.
    pub fn new(
        locales: Vec<String>,
        resource_ids: Vec<String>,
        loader: Box<dyn ResourceLoader>,
    ) -> Self {
        Self::with_config(locales, resource_ids, loader, BundleConfig::default())
    }

    /// Bundle options applied per locale (the `locale` field is replaced).
    pub fn with_config(
        locales: Vec<String>,
        resource_ids: Vec<String>,
        loader: Box<dyn ResourceLoader>,
        config_template: BundleConfig,
    ) -> Self {
        Self {
            locales,
            resource_ids,
            loader,
            config_template,
            bundles: Mutex::new(HashMap::new()),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// Bundle for one locale, built and populated on first access.
    fn bundle_for(&self, locale: &str) -> Option<Arc<FluentBundle>> {
        let mut bundles = match self.bundles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(bundle) = bundles.get(locale) {
            return Some(Arc::clone(bundle));
        }

        let config = BundleConfig {
            locale: locale.to_string(),
            ..self.config_template.clone()
        };
        let bundle = match FluentBundle::new(config) {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!("skipping locale {locale}: {err}");
                return None;
            }
        };

        let mut loaded_any = false;
        for resource_id in &self.resource_ids {
            match self.loader.load(locale, resource_id) {
                Ok(source) => match bundle.add_resource(&source) {
                    Ok(_) => loaded_any = true,
                    Err(err) => warn!("skipping {resource_id} for {locale}: {err}"),
                },
                Err(err) => debug!("{err}"),
            }
        }
        if !loaded_any {
            debug!("locale {locale} has no loadable resources");
        }

        let bundle = Arc::new(bundle);
        bundles.insert(locale.to_string(), Arc::clone(&bundle));
        Some(bundle)
    }

    /// Format `id`, falling back across the locale chain.
    ///
    /// The first bundle that actually has the message wins. When none
    /// does, the last bundle's fallback string is returned together with
    /// the accumulated missing-message error.
    pub fn format_value(
        &self,
        id: &str,
        args: Option<&FluentArgs>,
    ) -> (String, Vec<FluentError>) {
        let mut last: Option<(String, Vec<FluentError>)> = None;

        for locale in &self.locales {
            let Some(bundle) = self.bundle_for(locale) else {
                continue;
            };
            match bundle.format_pattern(id, args, None) {
                Ok((text, errors)) => {
                    let missing = errors
                        .iter()
                        .any(|e| e.code == DiagnosticCode::MessageNotFound);
                    if !missing {
                        return (text, errors);
                    }
                    last = Some((text, errors));
                }
                Err(FormatError::Formatting(err)) => {
                    // Strict bundles surface resolution failures; a missing
                    // message still falls through to the next locale.
                    let missing = err
                        .errors
                        .iter()
                        .any(|e| e.code == DiagnosticCode::MessageNotFound);
                    if !missing {
                        return (err.fallback, err.errors);
                    }
                    last = Some((err.fallback, err.errors));
                }
                Err(FormatError::Cache(err)) => {
                    warn!("cache failure for {id} in {locale}: {err}");
                }
            }
        }

        last.unwrap_or_else(|| {
            (
                format!("{{{id}}}"),
                vec![FluentError::new(
                    DiagnosticCode::MessageNotFound,
                    format!("unknown message: {id}"),
                )],
            )
        })
    }

    /// True if any locale in the chain defines `id`.
    pub fn has_message(&self, id: &str) -> bool {
        self.locales.iter().any(|locale| {
            self.bundle_for(locale)
                .map(|b| b.has_message(id))
                .unwrap_or(false)
        })
    }

    /// Union of message ids across the chain, sorted.
    pub fn message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .locales
            .iter()
            .filter_map(|locale| self.bundle_for(locale))
            .flat_map(|bundle| bundle.get_message_ids())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::args;

    fn chain(locales: &[&str]) -> Localization {
        let loader = StaticResourceLoader::new()
            .add("en", "main.ftl", "about = About\nhello = Hello, { $name }!\n")
            .add("lv", "main.ftl", "hello = Sveiki, { $name }!\n");
        Localization::with_config(
            locales.iter().map(|s| s.to_string()).collect(),
            vec!["main.ftl".to_string()],
            Box::new(loader),
            BundleConfig {
                use_isolating: false,
                ..BundleConfig::default()
            },
        )
    }

    #[test]
    fn primary_locale_wins_when_present() {
        let l10n = chain(&["lv", "en"]);
        let (text, errors) = l10n.format_value("hello", Some(&args([("name", "Anna".into())])));
        assert_eq!(text, "Sveiki, Anna!");
        assert!(errors.is_empty());
    }

    #[test]
    fn fallback_to_second_locale() {
        let l10n = chain(&["lv", "en"]);
        let (text, errors) = l10n.format_value("about", None);
        assert_eq!(text, "About");
        assert!(errors.is_empty());
    }

    #[test]
    fn all_locales_missing_returns_fallback() {
        let l10n = chain(&["lv", "en"]);
        let (text, errors) = l10n.format_value("absent", None);
        assert_eq!(text, "{absent}");
        assert!(errors
            .iter()
            .any(|e| e.code == DiagnosticCode::MessageNotFound));
    }

    #[test]
    fn unloadable_locale_is_skipped() {
        let l10n = chain(&["de", "en"]);
        let (text, _) = l10n.format_value("about", None);
        assert_eq!(text, "About");
    }

    #[test]
    fn has_message_checks_the_chain() {
        let l10n = chain(&["lv", "en"]);
        assert!(l10n.has_message("about"));
        assert!(l10n.has_message("hello"));
        assert!(!l10n.has_message("absent"));
    }

    #[test]
    fn message_ids_union() {
        let l10n = chain(&["lv", "en"]);
        assert_eq!(l10n.message_ids(), vec!["about", "hello"]);
    }

    #[test]
    fn bundles_are_lazy_and_reused() {
        let l10n = chain(&["lv", "en"]);
        {
            let built = l10n.bundles.lock().unwrap();
            assert!(built.is_empty());
        }
        let _ = l10n.format_value("hello", Some(&args([("name", "x".into())])));
        {
            let built = l10n.bundles.lock().unwrap();
            assert_eq!(built.len(), 1, "en never needed");
        }
    }

    #[test]
    fn file_loader_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let locale_dir = dir.path().join("en");
        std::fs::create_dir_all(&locale_dir).unwrap();
        std::fs::write(locale_dir.join("main.ftl"), "hi = Hi!\n").unwrap();

        let loader = FileResourceLoader::new(dir.path());
        assert_eq!(loader.load("en", "main.ftl").unwrap(), "hi = Hi!\n");
        assert!(matches!(
            loader.load("de", "main.ftl"),
            Err(ResourceLoaderError::NotFound { .. })
        ));

        let l10n = Localization::with_config(
            vec!["en".to_string()],
            vec!["main.ftl".to_string()],
            Box::new(FileResourceLoader::new(dir.path())),
            BundleConfig {
                use_isolating: false,
                ..BundleConfig::default()
            },
        );
        let (text, errors) = l10n.format_value("hi", None);
        assert_eq!(text, "Hi!");
        assert!(errors.is_empty());
    }

    #[test]
    fn concurrent_access_is_safe() {
        let l10n = std::sync::Arc::new(chain(&["lv", "en"]));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let l10n = std::sync::Arc::clone(&l10n);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    let (text, _) = l10n.format_value("about", None);
                    assert_eq!(text, "About");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread");
        }
    }
}
