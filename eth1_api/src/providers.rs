use url::Url;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ProviderStatus {
    Online,
    Offline,
}

/// One EL RPC endpoint together with its last observed status.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Provider {
    index: usize,
    status: ProviderStatus,
    url: Url,
}

impl Provider {
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.index > 0
    }
}

/// Ordered pool of EL RPC endpoints.
///
/// Requests start at the primary endpoint and fall over to the next one on
/// failure. `reset` rewinds to the primary for the next request without
/// forgetting which endpoints were seen offline.
pub struct Providers {
    current: usize,
    providers: Vec<Provider>,
}

impl Providers {
    pub fn new(urls: impl IntoIterator<Item = Url>) -> Self {
        let providers = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| Provider {
                index,
                status: ProviderStatus::Online,
                url,
            })
            .collect();

        Self {
            current: 0,
            providers,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn all_offline(&self) -> bool {
        self.providers
            .iter()
            .all(|provider| provider.status == ProviderStatus::Offline)
    }

    #[must_use]
    pub fn current(&self) -> Option<&Provider> {
        self.providers.get(self.current)
    }

    #[must_use]
    pub fn peek_next(&self) -> Option<&Provider> {
        self.providers.get(self.current.saturating_add(1))
    }

    pub fn mark_current_online(&mut self) {
        self.set_current_status(ProviderStatus::Online);
    }

    pub fn mark_current_offline(&mut self) {
        self.set_current_status(ProviderStatus::Offline);
    }

    pub fn advance(&mut self) {
        self.current = self.current.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    fn set_current_status(&mut self, status: ProviderStatus) {
        if let Some(provider) = self.providers.get_mut(self.current) {
            provider.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn empty_pool_has_no_current_provider() {
        let providers = Providers::new([]);

        assert!(providers.is_empty());
        assert!(providers.all_offline());
        assert!(providers.current().is_none());
        assert!(providers.peek_next().is_none());
    }

    #[test]
    fn fall_over_walks_the_pool_in_order() -> Result<()> {
        let mut providers = Providers::new([
            "https://primary.example".parse()?,
            "https://fallback.example".parse()?,
        ]);

        let current = providers.current().expect("pool is not empty");

        assert!(!current.is_fallback());
        assert_eq!(current.url().as_str(), "https://primary.example/");

        providers.mark_current_offline();
        providers.advance();

        let current = providers.current().expect("fallback is available");

        assert!(current.is_fallback());
        assert!(!providers.all_offline());

        providers.mark_current_offline();
        providers.advance();

        assert!(providers.current().is_none());
        assert!(providers.all_offline());

        providers.reset();

        // A reset rewinds the cursor but keeps the offline bookkeeping.
        assert!(providers.all_offline());
        assert!(providers.current().is_some());

        providers.mark_current_online();

        assert!(!providers.all_offline());

        Ok(())
    }
}
