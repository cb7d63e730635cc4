use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    evaluator::{labels, EvaluationResult, Evaluator},
    fetcher::{ChangeFetcher, HttpChangeFetcher},
    impressions::Impression,
    notification::NotificationQueue,
    readiness::ReadinessGate,
    store::{FlagStore, SegmentStore},
    sync_manager::SyncManager,
    validation, Attributes, ClientConfig, EvaluationError, Error, Key, Result, CONTROL_TREATMENT,
};

/// A treatment together with its configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitResult {
    /// Treatment served to the key.
    pub treatment: String,
    /// Configuration payload attached to the treatment.
    pub config: Option<String>,
}

impl SplitResult {
    fn control() -> SplitResult {
        SplitResult {
            treatment: CONTROL_TREATMENT.to_owned(),
            config: None,
        }
    }
}

/// A client evaluating feature flags against a local replica.
///
/// In order to create a client instance, first create [`ClientConfig`]. The replica stays empty
/// (and every flag evaluates to `control`) until synchronization is started and the client
/// becomes ready.
///
/// Evaluation calls never fail: invalid input, unknown flags and internal faults all produce the
/// `control` treatment.
///
/// # Examples
/// ```
/// # use splitio::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::from_api_key("api-key"));
/// assert_eq!(client.get_treatment("user-1", "new-checkout", &Default::default()), "control");
/// ```
pub struct Client<'a> {
    flags: Arc<FlagStore>,
    segments: Arc<SegmentStore>,
    evaluator: Evaluator,
    gate: Arc<ReadinessGate>,
    config: ClientConfig<'a>,
    sync: Mutex<Option<SyncManager>>,
    destroyed: AtomicBool,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    pub fn new(config: ClientConfig<'a>) -> Self {
        let flags = Arc::new(FlagStore::new());
        let segments = Arc::new(SegmentStore::new());
        Client {
            evaluator: Evaluator::new(flags.clone(), segments.clone()),
            flags,
            segments,
            gate: Arc::new(ReadinessGate::new()),
            config,
            sync: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Start background synchronization against the configured SDK API.
    ///
    /// Returns the queue to forward push notifications to. Calling this again returns the queue of
    /// the running synchronization.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSdkUrl`] if the configured URL cannot be parsed.
    /// - [`Error::ClientDestroyed`] after [`Client::destroy`].
    /// - [`Error::Io`] if background threads cannot be spawned.
    pub fn start_synchronization(&self) -> Result<NotificationQueue> {
        url::Url::parse(&self.config.sdk_url).map_err(Error::InvalidSdkUrl)?;
        let fetcher = HttpChangeFetcher::new(&*self.config.sdk_url, &*self.config.api_key);
        self.start_synchronization_with_fetcher(Arc::new(fetcher))
    }

    /// Start background synchronization using a custom [`ChangeFetcher`].
    pub fn start_synchronization_with_fetcher(
        &self,
        fetcher: Arc<dyn ChangeFetcher>,
    ) -> Result<NotificationQueue> {
        let mut sync = self.sync.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock: `destroy` sets the flag before taking it.
        if self.is_destroyed() {
            return Err(Error::ClientDestroyed);
        }
        if let Some(sync) = &*sync {
            return Ok(sync.notification_queue());
        }

        let manager = SyncManager::start(
            fetcher,
            self.flags.clone(),
            self.segments.clone(),
            self.gate.clone(),
            self.config.flag_sets_filter.clone(),
            self.config.poller.clone(),
        )?;
        let queue = manager.notification_queue();
        *sync = Some(manager);
        Ok(queue)
    }

    /// Block until the replica holds a complete snapshot, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `timeout` is zero.
    /// - [`Error::ClientDestroyed`] after [`Client::destroy`].
    /// - [`Error::Timeout`] if the client did not become ready in time.
    pub fn block_until_ready(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgument("timeout must be greater than zero"));
        }
        if self.is_destroyed() {
            return Err(Error::ClientDestroyed);
        }
        if self.gate.wait_until_ready(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout(timeout))
        }
    }

    /// Whether the replica has been fully synchronized at least once.
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Stop synchronization. Afterwards every evaluation returns `control`.
    ///
    /// Destroying an already destroyed client does nothing.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::info!(target: "splitio", "destroying client");
        let sync = self
            .sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sync {
            Some(sync) => sync.shutdown(),
            None => Ok(()),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Get the treatment of `flag_name` for `key`.
    pub fn get_treatment(
        &self,
        key: impl Into<Key>,
        flag_name: &str,
        attributes: &Attributes,
    ) -> String {
        self.treatment(&key.into(), flag_name, attributes, "get_treatment")
            .treatment
    }

    /// Get the treatment of `flag_name` for `key`, together with its configuration.
    pub fn get_treatment_with_config(
        &self,
        key: impl Into<Key>,
        flag_name: &str,
        attributes: &Attributes,
    ) -> SplitResult {
        self.treatment(&key.into(), flag_name, attributes, "get_treatment_with_config")
    }

    /// Get the treatments of several flags for `key`.
    pub fn get_treatments(
        &self,
        key: impl Into<Key>,
        flag_names: &[&str],
        attributes: &Attributes,
    ) -> HashMap<String, String> {
        without_config(self.treatments(&key.into(), flag_names, attributes, "get_treatments"))
    }

    /// Get the treatments of several flags for `key`, together with their configurations.
    pub fn get_treatments_with_config(
        &self,
        key: impl Into<Key>,
        flag_names: &[&str],
        attributes: &Attributes,
    ) -> HashMap<String, SplitResult> {
        self.treatments(
            &key.into(),
            flag_names,
            attributes,
            "get_treatments_with_config",
        )
    }

    /// Get the treatments of all flags tagged with `flag_set`.
    pub fn get_treatments_by_flag_set(
        &self,
        key: impl Into<Key>,
        flag_set: &str,
        attributes: &Attributes,
    ) -> HashMap<String, String> {
        without_config(self.treatments_by_flag_sets(
            &key.into(),
            &[flag_set],
            attributes,
            "get_treatments_by_flag_set",
        ))
    }

    /// Get the treatments of all flags tagged with any of `flag_sets`.
    pub fn get_treatments_by_flag_sets(
        &self,
        key: impl Into<Key>,
        flag_sets: &[&str],
        attributes: &Attributes,
    ) -> HashMap<String, String> {
        without_config(self.treatments_by_flag_sets(
            &key.into(),
            flag_sets,
            attributes,
            "get_treatments_by_flag_sets",
        ))
    }

    /// Get the treatments of all flags tagged with `flag_set`, together with their configurations.
    pub fn get_treatments_with_config_by_flag_set(
        &self,
        key: impl Into<Key>,
        flag_set: &str,
        attributes: &Attributes,
    ) -> HashMap<String, SplitResult> {
        self.treatments_by_flag_sets(
            &key.into(),
            &[flag_set],
            attributes,
            "get_treatments_with_config_by_flag_set",
        )
    }

    /// Get the treatments of all flags tagged with any of `flag_sets`, together with their
    /// configurations.
    pub fn get_treatments_with_config_by_flag_sets(
        &self,
        key: impl Into<Key>,
        flag_sets: &[&str],
        attributes: &Attributes,
    ) -> HashMap<String, SplitResult> {
        self.treatments_by_flag_sets(
            &key.into(),
            flag_sets,
            attributes,
            "get_treatments_with_config_by_flag_sets",
        )
    }

    fn treatment(
        &self,
        key: &Key,
        flag_name: &str,
        attributes: &Attributes,
        method: &'static str,
    ) -> SplitResult {
        if !self.check_usable(method) || !validation::validate_key(key, method) {
            return SplitResult::control();
        }
        let Some(flag_name) = validation::validate_flag_name(flag_name, method) else {
            return SplitResult::control();
        };
        let result = self.evaluator.evaluate(key, flag_name, attributes);
        self.record(key, flag_name, attributes, result, method)
    }

    fn treatments(
        &self,
        key: &Key,
        flag_names: &[&str],
        attributes: &Attributes,
        method: &'static str,
    ) -> HashMap<String, SplitResult> {
        let flag_names: Vec<&str> = flag_names
            .iter()
            .copied()
            .filter_map(|name| validation::validate_flag_name(name, method))
            .collect();

        if !self.check_usable(method) || !validation::validate_key(key, method) {
            return flag_names
                .into_iter()
                .map(|name| (name.to_owned(), SplitResult::control()))
                .collect();
        }

        self.evaluator
            .evaluate_many(key, flag_names.as_slice(), attributes)
            .into_iter()
            .map(|(name, result)| {
                let result = self.record(key, &name, attributes, result, method);
                (name, result)
            })
            .collect()
    }

    fn treatments_by_flag_sets(
        &self,
        key: &Key,
        flag_sets: &[&str],
        attributes: &Attributes,
        method: &'static str,
    ) -> HashMap<String, SplitResult> {
        if !self.check_usable(method) || !validation::validate_key(key, method) {
            return HashMap::new();
        }

        let mut flag_sets = validation::sanitize_flag_sets(flag_sets, method);
        let filter = &self.config.flag_sets_filter;
        if !filter.is_empty() {
            flag_sets.retain(|flag_set| {
                let known = filter.contains(flag_set);
                if !known {
                    log::warn!(target: "splitio", method, flag_set:display = flag_set;
                               "flag set is not part of the configured flag sets filter, ignoring it");
                }
                known
            });
        }
        if flag_sets.is_empty() {
            return HashMap::new();
        }

        self.evaluator
            .evaluate_by_flag_sets(key, &flag_sets, attributes)
            .into_iter()
            .map(|(name, result)| {
                let result = self.record(key, &name, attributes, result, method);
                (name, result)
            })
            .collect()
    }

    /// Whether evaluation may proceed. Warns about use before readiness.
    fn check_usable(&self, method: &'static str) -> bool {
        if self.is_destroyed() {
            log::warn!(target: "splitio", method; "client has already been destroyed, returning control");
            return false;
        }
        if !self.is_ready() {
            log::warn!(target: "splitio", method;
                       "the sdk is not ready, results may be incorrect. Make sure to wait for readiness using block_until_ready");
        }
        true
    }

    /// Turn an evaluation outcome into the caller's result, emitting an impression when due.
    fn record(
        &self,
        key: &Key,
        flag_name: &str,
        attributes: &Attributes,
        result: std::result::Result<EvaluationResult, EvaluationError>,
        method: &'static str,
    ) -> SplitResult {
        let result = match result {
            Ok(result) if result.label == labels::DEFINITION_NOT_FOUND && self.is_ready() => {
                log::warn!(target: "splitio", method, flag_name;
                           "flag does not exist in this environment, returning control");
                return SplitResult::control();
            }
            Ok(result) => result,
            Err(err) => {
                log::error!(target: "splitio",
                            method,
                            flag_name,
                            matching_key = key.matching_key(),
                            error:display = err;
                            "error evaluating flag, returning control");
                EvaluationResult::control(labels::EXCEPTION, Some(err.change_number()))
            }
        };

        self.log_impression(Impression {
            matching_key: key.matching_key().to_owned(),
            bucketing_key: key.explicit_bucketing_key().map(str::to_owned),
            flag_name: flag_name.to_owned(),
            treatment: result.treatment.clone(),
            time: Utc::now().timestamp_millis(),
            label: self.config.labels_enabled.then(|| result.label.clone()),
            change_number: result.change_number,
            attributes: attributes.clone(),
        });

        SplitResult {
            treatment: result.treatment,
            config: result.configuration,
        }
    }

    fn log_impression(&self, impression: Impression) {
        log::trace!(target: "splitio",
                    impression:serde;
                    "logging impression");
        let listener = &self.config.impression_listener;
        if catch_unwind(AssertUnwindSafe(|| listener.log_impression(impression))).is_err() {
            log::error!(target: "splitio", "impression listener panicked");
        }
    }
}

impl Drop for Client<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            log::warn!(target: "splitio", error:display = err; "failed to stop synchronization");
        }
    }
}

fn without_config(results: HashMap<String, SplitResult>) -> HashMap<String, String> {
    results
        .into_iter()
        .map(|(name, result)| (name, result.treatment))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use serde_json::json;

    use crate::{
        evaluator::labels,
        flag::Flag,
        models::FlagDto,
        synchronizer::tests::FakeFetcher,
        AttributeValue, Client, ClientConfig, Error, Impression, Key,
    };

    fn store_flag(client: &Client, value: serde_json::Value) {
        client
            .flags
            .put(Flag::from(serde_json::from_value::<FlagDto>(value).unwrap()));
    }

    fn on_flag(name: &str, sets: &[&str]) -> serde_json::Value {
        json!({
            "name": name,
            "status": "ACTIVE",
            "defaultTreatment": "off",
            "changeNumber": 5,
            "sets": sets,
            "configurations": { "on": "{\"size\":3}" },
            "conditions": [{
                "matcherGroup": { "combiner": "AND", "matchers": [{ "matcherType": "ALL_KEYS" }] },
                "partitions": [{ "treatment": "on", "size": 100 }],
                "label": "default rule"
            }]
        })
    }

    fn recording_client(
        impressions: Arc<Mutex<Vec<Impression>>>,
        configure: impl FnOnce(&mut ClientConfig),
    ) -> Client<'static> {
        let mut config = ClientConfig::from_api_key("api-key");
        config.impression_listener(move |impression: Impression| {
            impressions.lock().unwrap().push(impression)
        });
        configure(&mut config);
        let client = config.to_client();
        client.gate.mark_ready();
        client
    }

    #[test]
    fn returns_control_while_replica_is_empty() {
        let client = ClientConfig::from_api_key("api-key").to_client();
        assert_eq!(
            client.get_treatment("alice", "flag", &HashMap::new()),
            "control"
        );
    }

    #[test]
    fn evaluates_and_logs_impressions() {
        let impressions = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(impressions.clone(), |_| {});
        store_flag(&client, on_flag("checkout", &[]));

        let attributes = HashMap::from([("plan".to_owned(), AttributeValue::from("pro"))]);
        let result = client.get_treatment_with_config(
            Key::with_bucketing_key("alice", "account-1"),
            "checkout",
            &attributes,
        );
        assert_eq!(result.treatment, "on");
        assert_eq!(result.config.as_deref(), Some(r#"{"size":3}"#));

        let impressions = impressions.lock().unwrap();
        assert_eq!(impressions.len(), 1);
        let impression = &impressions[0];
        assert_eq!(impression.matching_key, "alice");
        assert_eq!(impression.bucketing_key.as_deref(), Some("account-1"));
        assert_eq!(impression.flag_name, "checkout");
        assert_eq!(impression.treatment, "on");
        assert_eq!(impression.label.as_deref(), Some("default rule"));
        assert_eq!(impression.change_number, Some(5));
        assert_eq!(impression.attributes, attributes);
    }

    #[test]
    fn labels_can_be_disabled() {
        let impressions = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(impressions.clone(), |config| {
            config.labels_enabled(false);
        });
        store_flag(&client, on_flag("checkout", &[]));

        client.get_treatment("alice", "checkout", &HashMap::new());

        assert_eq!(impressions.lock().unwrap()[0].label, None);
    }

    #[test]
    fn unknown_flag_when_ready_has_no_impression() {
        let impressions = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(impressions.clone(), |_| {});

        assert_eq!(
            client.get_treatment("alice", "missing", &HashMap::new()),
            "control"
        );
        assert!(impressions.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_input_returns_control_without_impression() {
        let impressions = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(impressions.clone(), |_| {});
        store_flag(&client, on_flag("checkout", &[]));

        assert_eq!(client.get_treatment("", "checkout", &HashMap::new()), "control");
        assert_eq!(
            client.get_treatment("a".repeat(251), "checkout", &HashMap::new()),
            "control"
        );
        assert_eq!(client.get_treatment("alice", "  ", &HashMap::new()), "control");
        assert!(impressions.lock().unwrap().is_empty());

        // Surrounding whitespace is trimmed.
        assert_eq!(
            client.get_treatment("alice", " checkout ", &HashMap::new()),
            "on"
        );
    }

    #[test]
    fn evaluation_faults_become_control_with_exception_label() {
        let impressions = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(impressions.clone(), |_| {});
        for (name, dependency, change_number) in [("a", "b", 10), ("b", "a", 20)] {
            store_flag(
                &client,
                json!({
                    "name": name,
                    "status": "ACTIVE",
                    "defaultTreatment": "off",
                    "changeNumber": change_number,
                    "conditions": [{
                        "matcherGroup": { "combiner": "AND", "matchers": [{
                            "matcherType": "IN_SPLIT_TREATMENT",
                            "dependencyMatcherData": { "split": dependency, "treatments": ["on"] }
                        }] },
                        "partitions": [{ "treatment": "on", "size": 100 }],
                        "label": "dependency"
                    }]
                }),
            );
        }

        assert_eq!(client.get_treatment("alice", "a", &HashMap::new()), "control");

        let impressions = impressions.lock().unwrap();
        assert_eq!(impressions[0].label.as_deref(), Some(labels::EXCEPTION));
        assert_eq!(impressions[0].change_number, Some(10));
    }

    #[test]
    fn multiple_treatments() {
        let client = recording_client(Arc::default(), |_| {});
        store_flag(&client, on_flag("a", &[]));
        store_flag(&client, on_flag("b", &[]));

        let treatments = client.get_treatments("alice", &["a", "b", "missing", ""], &HashMap::new());

        assert_eq!(
            treatments,
            HashMap::from([
                ("a".to_owned(), "on".to_owned()),
                ("b".to_owned(), "on".to_owned()),
                ("missing".to_owned(), "control".to_owned()),
            ])
        );
    }

    #[test]
    fn treatments_by_flag_sets_respect_filter() {
        let client = recording_client(Arc::default(), |config| {
            config.flag_sets_filter(&["frontend"]);
        });
        store_flag(&client, on_flag("a", &["frontend"]));
        store_flag(&client, on_flag("b", &["backend"]));

        let treatments =
            client.get_treatments_by_flag_sets("alice", &["Frontend", "backend"], &HashMap::new());
        assert_eq!(
            treatments,
            HashMap::from([("a".to_owned(), "on".to_owned())])
        );

        assert!(client
            .get_treatments_by_flag_set("alice", "backend", &HashMap::new())
            .is_empty());
        assert!(client
            .get_treatments_with_config_by_flag_set("alice", "-invalid-", &HashMap::new())
            .is_empty());
    }

    #[test]
    fn panicking_listener_is_contained() {
        let mut config = ClientConfig::from_api_key("api-key");
        config.impression_listener(|_: Impression| panic!("listener failure"));
        let client = config.to_client();
        store_flag(&client, on_flag("checkout", &[]));

        assert_eq!(
            client.get_treatment("alice", "checkout", &HashMap::new()),
            "on"
        );
    }

    #[test]
    fn destroyed_client_returns_control() {
        let client = recording_client(Arc::default(), |_| {});
        store_flag(&client, on_flag("checkout", &["frontend"]));
        client.destroy().unwrap();
        client.destroy().unwrap();

        assert_eq!(
            client.get_treatment("alice", "checkout", &HashMap::new()),
            "control"
        );
        assert!(client
            .get_treatments_by_flag_set("alice", "frontend", &HashMap::new())
            .is_empty());
        assert!(matches!(
            client.start_synchronization_with_fetcher(Arc::new(FakeFetcher::default())),
            Err(Error::ClientDestroyed)
        ));
    }

    #[test]
    fn destroy_racing_with_start_leaves_no_synchronization_behind() {
        for _ in 0..20 {
            let client = ClientConfig::from_api_key("api-key").to_client();
            let fetcher = Arc::new(FakeFetcher::default());
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = client.start_synchronization_with_fetcher(fetcher);
                });
                scope.spawn(|| client.destroy().unwrap());
            });
            assert!(client.sync.lock().unwrap().is_none());
        }
    }

    #[test]
    fn block_until_ready() {
        let client = ClientConfig::from_api_key("api-key").to_client();
        assert!(matches!(
            client.block_until_ready(Duration::ZERO),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.block_until_ready(Duration::from_millis(10)),
            Err(Error::Timeout(_))
        ));

        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.add_flags(-1, 10, json!([on_flag("checkout", &[])]));
        client.start_synchronization_with_fetcher(fetcher).unwrap();

        client.block_until_ready(Duration::from_secs(5)).unwrap();
        assert!(client.is_ready());
        assert_eq!(
            client.get_treatment("alice", "checkout", &HashMap::new()),
            "on"
        );
        client.destroy().unwrap();
    }

    #[test]
    fn invalid_sdk_url() {
        let mut config = ClientConfig::from_api_key("api-key");
        config.sdk_url("not a url");
        let client = config.to_client();
        assert!(matches!(
            client.start_synchronization(),
            Err(Error::InvalidSdkUrl(_))
        ));
    }
}
