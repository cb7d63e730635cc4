use std::collections::HashSet;

use crate::{
    fetcher::DEFAULT_SDK_URL, impressions::NoopImpressionListener, validation, Client,
    ImpressionListener, PollerConfig,
};

/// Configuration for [`Client`].
pub struct ClientConfig<'a> {
    pub(crate) api_key: String,
    pub(crate) sdk_url: String,
    pub(crate) impression_listener: Box<dyn ImpressionListener + Send + Sync + 'a>,
    pub(crate) flag_sets_filter: HashSet<String>,
    pub(crate) labels_enabled: bool,
    pub(crate) poller: PollerConfig,
}

impl<'a> ClientConfig<'a> {
    /// Create a default configuration using the specified API key.
    ///
    /// ```
    /// # use splitio::ClientConfig;
    /// ClientConfig::from_api_key("api-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            sdk_url: ClientConfig::DEFAULT_SDK_URL.to_owned(),
            impression_listener: Box::new(NoopImpressionListener),
            flag_sets_filter: HashSet::new(),
            labels_enabled: true,
            poller: PollerConfig::default(),
        }
    }

    /// Set impression listener to pass evaluations to your data warehouse.
    ///
    /// ```
    /// # use splitio::{ClientConfig, Impression};
    /// let mut config = ClientConfig::from_api_key("api-key");
    /// config.impression_listener(|impression: Impression| {
    ///   println!("{:?}", impression);
    /// });
    /// ```
    pub fn impression_listener(
        &mut self,
        impression_listener: impl ImpressionListener + Send + Sync + 'a,
    ) -> &mut Self {
        self.impression_listener = Box::new(impression_listener);
        self
    }

    /// Default base URL for API calls.
    pub const DEFAULT_SDK_URL: &'static str = DEFAULT_SDK_URL;

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn sdk_url(&mut self, sdk_url: impl Into<String>) -> &mut Self {
        self.sdk_url = sdk_url.into();
        self
    }

    /// Only synchronize flags tagged with one of `flag_sets`.
    ///
    /// Names are lower-cased and trimmed. Invalid names are logged and ignored.
    pub fn flag_sets_filter<S: AsRef<str>>(&mut self, flag_sets: &[S]) -> &mut Self {
        self.flag_sets_filter = validation::sanitize_flag_sets(flag_sets, "flag_sets_filter")
            .into_iter()
            .collect();
        self
    }

    /// Whether impressions carry the label explaining the evaluation. Enabled by default.
    pub fn labels_enabled(&mut self, labels_enabled: bool) -> &mut Self {
        self.labels_enabled = labels_enabled;
        self
    }

    /// Override polling configuration.
    pub fn poller(&mut self, poller: PollerConfig) -> &mut Self {
        self.poller = poller;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use splitio::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("api-key").to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}
