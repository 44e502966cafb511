use std::sync::Arc;

use shared::domain::Theme;
use storage::{PreferenceStore, DARK_MODE_KEY};
use tracing::{debug, warn};

/// Holds the presentation mode and mirrors every change into the preference store.
///
/// Storage problems never escape: a failed read starts in light mode and a
/// failed write keeps the toggled value for the rest of the session.
pub struct ThemeController {
    store: Arc<dyn PreferenceStore>,
    theme: Theme,
}

impl ThemeController {
    pub async fn load(store: Arc<dyn PreferenceStore>) -> Self {
        let theme = match store.get_bool(DARK_MODE_KEY).await {
            Ok(flag) => Theme::from_dark_flag(flag.unwrap_or(false)),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not read theme preference; using light mode");
                Theme::Light
            }
        };
        debug!(?theme, "loaded theme preference");
        Self { store, theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub async fn toggle(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        if let Err(err) = self.store.set_bool(DARK_MODE_KEY, self.theme.is_dark()).await {
            warn!(error = %format!("{err:#}"), "could not persist theme preference");
        }
        self.theme
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use storage::MemoryPreferenceStore;

    use super::*;

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPreferenceStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl PreferenceStore for CountingStore {
        async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
            self.inner.get_bool(key).await
        }

        async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_bool(key, value).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl PreferenceStore for BrokenStore {
        async fn get_bool(&self, _key: &str) -> Result<Option<bool>> {
            Err(anyhow!("storage unavailable"))
        }

        async fn set_bool(&self, _key: &str, _value: bool) -> Result<()> {
            Err(anyhow!("storage unavailable"))
        }
    }

    #[tokio::test]
    async fn toggling_twice_restores_flag_with_two_writes() {
        let store = Arc::new(CountingStore::default());
        store.inner.set_bool(DARK_MODE_KEY, false).await.expect("seed");

        let mut controller = ThemeController::load(store.clone()).await;
        assert_eq!(controller.theme(), Theme::Light);

        assert_eq!(controller.toggle().await, Theme::Dark);
        assert_eq!(
            store.get_bool(DARK_MODE_KEY).await.expect("read"),
            Some(true)
        );
        assert_eq!(controller.toggle().await, Theme::Light);

        assert_eq!(
            store.get_bool(DARK_MODE_KEY).await.expect("read"),
            Some(false)
        );
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn loads_persisted_dark_mode() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.set_bool(DARK_MODE_KEY, true).await.expect("seed");
        let controller = ThemeController::load(store).await;
        assert_eq!(controller.theme(), Theme::Dark);
    }

    #[tokio::test]
    async fn missing_flag_defaults_to_light() {
        let controller = ThemeController::load(Arc::new(MemoryPreferenceStore::new())).await;
        assert_eq!(controller.theme(), Theme::Light);
    }

    #[tokio::test]
    async fn storage_failures_degrade_to_in_memory_theme() {
        let mut controller = ThemeController::load(Arc::new(BrokenStore)).await;
        assert_eq!(controller.theme(), Theme::Light);
        assert_eq!(controller.toggle().await, Theme::Dark);
        assert_eq!(controller.theme(), Theme::Dark);
    }
}
