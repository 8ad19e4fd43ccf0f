use booknest_core::{Result, SiteSettings, Store};
use tracing::info;

/// The stored settings, saving the defaults on first access.
pub async fn current(store: &dyn Store) -> Result<SiteSettings> {
    if let Some(settings) = store.load_settings().await? {
        return Ok(settings);
    }
    let settings = SiteSettings::default();
    store.save_settings(&settings).await?;
    info!("Initialised default site settings");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use booknest_store::MemoryStore;

    #[tokio::test]
    async fn defaults_are_persisted_once() {
        let store = MemoryStore::new();
        assert!(store.load_settings().await.unwrap().is_none());

        let settings = current(&store).await.unwrap();
        assert_eq!(settings, SiteSettings::default());
        assert_eq!(store.load_settings().await.unwrap(), Some(settings));
    }
}
