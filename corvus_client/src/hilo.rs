//! HiLo document id generation.
//!
//! A generator holds an exclusive id range obtained from the server and
//! hands out incrementing ids locally until the range is exhausted, then
//! fetches the next one. Ranges are disjoint across clients because the
//! server allocates them with an atomic increment, so ids never collide
//! even when several application instances write to the same collection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
    commands::hilo::{NextHiLoRangeCommand, ReturnHiLoRangeCommand},
    request_executor::{RequestExecutor, RequestExecutorError},
};

/// An exclusive id range for one collection. `current` is the next id to
/// hand out; `current > max_id` means the range is spent.
#[derive(Debug, Clone, Copy)]
pub struct IdRange {
    min_id: i64,
    max_id: i64,
    current: i64,
}

impl IdRange {
    pub fn new(min_id: i64, max_id: i64) -> Self {
        Self {
            min_id,
            max_id,
            current: min_id,
        }
    }

    pub fn min_id(&self) -> i64 {
        self.min_id
    }

    pub fn max_id(&self) -> i64 {
        self.max_id
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn needs_new_range(&self) -> bool {
        self.current > self.max_id
    }

    fn next(&mut self) -> Option<i64> {
        if self.current > self.max_id {
            return None;
        }
        let id = self.current;
        self.current += 1;
        Some(id)
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    range: Option<IdRange>,
    server_tag: String,
    last_batch_size: i64,
}

/// Id generator for one (database, collection) pair. All callers go
/// through one async mutex: increments are atomic, and a caller that
/// observes an exhausted range while a fetch is already in flight waits on
/// the lock for that fetch instead of issuing its own.
#[derive(Debug)]
pub struct HiLoIdGenerator {
    executor: RequestExecutor,
    collection: String,
    separator: char,
    state: Mutex<GeneratorState>,
}

impl HiLoIdGenerator {
    pub fn new(executor: RequestExecutor, collection: impl Into<String>) -> Self {
        let separator = executor.conventions().identity_parts_separator();
        Self {
            executor,
            collection: collection.into(),
            separator,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Returns the next id, shaped `"{collection}/{number}-{node tag}"`.
    /// Fetches a fresh range from the server when none is held or the held
    /// one is spent.
    #[instrument(level = "debug", skip(self), fields(collection = %self.collection))]
    pub async fn generate_document_id(&self) -> Result<String, RequestExecutorError> {
        let mut guard = self.state.lock().await;
        loop {
            let state = &mut *guard;
            if let Some(id) = state.range.as_mut().and_then(IdRange::next) {
                return Ok(format!(
                    "{}{}{}-{}",
                    self.collection, self.separator, id, state.server_tag
                ));
            }

            let last_max = state.range.as_ref().map(IdRange::max_id).unwrap_or(0);
            let command = NextHiLoRangeCommand::new(
                self.collection.clone(),
                state.last_batch_size,
                last_max,
                self.separator,
            );
            let result = self.executor.execute(&command).await?;
            tracing::debug!(
                "Received id range [{}, {}] for `{}`.",
                result.low,
                result.high,
                self.collection
            );

            guard.last_batch_size = result.high - result.low + 1;
            guard.server_tag = result.server_tag;
            guard.range = Some(IdRange::new(result.low, result.high));
        }
    }

    /// Snapshot of the currently held range, for introspection.
    pub async fn current_range(&self) -> Option<IdRange> {
        self.state.lock().await.range
    }

    /// Hands the unused tail of the held range back to the server so the
    /// next allocator can reuse it. Best-effort: a failure only wastes id
    /// space, so it is logged and swallowed.
    #[instrument(level = "debug", skip(self), fields(collection = %self.collection))]
    pub async fn return_unused_range(&self) {
        let mut guard = self.state.lock().await;
        let Some(range) = guard.range.take() else {
            return;
        };
        if range.needs_new_range() {
            return;
        }

        let command =
            ReturnHiLoRangeCommand::new(self.collection.clone(), range.max_id(), range.current() - 1);
        if let Err(e) = self.executor.execute(&command).await {
            tracing::error!(
                "Could not return the unused id range for `{}`. Caused by: {}",
                self.collection,
                e
            );
        }
    }
}

/// One generator per (database, collection), lazily created. Owned by the
/// document store actor, which returns all unused ranges on close.
#[derive(Debug, Default)]
pub struct MultiDatabaseHiLoIdGenerator {
    generators: HashMap<(String, String), Arc<HiLoIdGenerator>>,
}

impl MultiDatabaseHiLoIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generator_for(
        &mut self,
        database: &str,
        collection: &str,
        executor: &RequestExecutor,
    ) -> Arc<HiLoIdGenerator> {
        self.generators
            .entry((database.to_string(), collection.to_string()))
            .or_insert_with(|| Arc::new(HiLoIdGenerator::new(executor.clone(), collection)))
            .clone()
    }

    pub async fn return_unused_ranges(&self) {
        for generator in self.generators.values() {
            generator.return_unused_range().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        request_executor::{RequestExecutor, TransportConfig},
        DocumentConventions,
    };

    use super::HiLoIdGenerator;

    fn range_body(low: i64, high: i64) -> serde_json::Value {
        serde_json::json!({
            "Prefix": "Products/",
            "Low": low,
            "High": high,
            "LastSize": high - low + 1,
            "ServerTag": "A"
        })
    }

    fn test_executor(uri: &str) -> RequestExecutor {
        RequestExecutor::create_for_single_node(
            Url::parse(uri).unwrap(),
            "northwind",
            DocumentConventions::default_for_single_server()
                .set_request_timeout(Duration::from_millis(500)),
            TransportConfig::default(),
        )
        .unwrap()
    }

    fn id_number(id: &str) -> i64 {
        id.trim_start_matches("Products/")
            .trim_end_matches("-A")
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn ids_start_from_one_and_carry_the_server_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 32)))
            .mount(&server)
            .await;

        let generator = HiLoIdGenerator::new(test_executor(&server.uri()), "Products");

        let id = generator.generate_document_id().await.unwrap();

        assert_eq!(id, "Products/1-A");
    }

    #[tokio::test]
    async fn ids_increase_by_one_with_no_gaps_across_range_boundaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 5)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(6, 10)))
            .mount(&server)
            .await;

        let generator = HiLoIdGenerator::new(test_executor(&server.uri()), "Products");

        let mut previous = None;
        for _ in 0..10 {
            let id = generator.generate_document_id().await.unwrap();
            let number = id_number(&id);
            if let Some(previous) = previous {
                assert_eq!(number - previous, 1);
            }
            previous = Some(number);
        }
        assert_eq!(previous, Some(10));
    }

    #[tokio::test]
    async fn a_new_range_starts_above_the_previous_maximum() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 3)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(4, 6)))
            .mount(&server)
            .await;

        let generator = HiLoIdGenerator::new(test_executor(&server.uri()), "Products");

        let mut max_id = None;
        loop {
            generator.generate_document_id().await.unwrap();
            let range = generator.current_range().await.unwrap();
            if max_id.is_none() {
                max_id = Some(range.max_id());
            }
            if range.needs_new_range() {
                break;
            }
        }

        generator.generate_document_id().await.unwrap();
        let range = generator.current_range().await.unwrap();
        assert!(range.min_id() > max_id.unwrap());
    }

    #[tokio::test]
    async fn concurrent_exhaustion_triggers_exactly_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 2)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(3, 4)))
            .mount(&server)
            .await;

        let generator =
            std::sync::Arc::new(HiLoIdGenerator::new(test_executor(&server.uri()), "Products"));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let generator = generator.clone();
            handles.push(tokio::spawn(
                async move { generator.generate_document_id().await },
            ));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(id_number(&handle.await.unwrap().unwrap()));
        }
        numbers.sort_unstable();

        // Four callers, two ids per range: exactly two fetches, no wasted
        // ranges, no duplicate ids.
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        let fetches = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/databases/northwind/hilo/next")
            .count();
        assert_eq!(fetches, 2);
    }

    #[tokio::test]
    async fn returning_an_unused_range_reports_the_last_used_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 10)))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/databases/northwind/hilo/return"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let generator = HiLoIdGenerator::new(test_executor(&server.uri()), "Products");
        for _ in 0..3 {
            generator.generate_document_id().await.unwrap();
        }

        generator.return_unused_range().await;

        let requests = server.received_requests().await.unwrap();
        let returned = requests
            .iter()
            .find(|r| r.url.path() == "/databases/northwind/hilo/return")
            .expect("no return request was sent");
        let query: Vec<(String, String)> = returned
            .url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("end".to_string(), "10".to_string())));
        assert!(query.contains(&("last".to_string(), "3".to_string())));
        assert!(generator.current_range().await.is_none());
    }

    #[tokio::test]
    async fn a_failed_range_return_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/northwind/hilo/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(range_body(1, 10)))
            .mount(&server)
            .await;
        // No mock for the return end point; the server answers 404.

        let generator = HiLoIdGenerator::new(test_executor(&server.uri()), "Products");
        generator.generate_document_id().await.unwrap();

        // Must not panic or propagate the failure.
        generator.return_unused_range().await;
    }
}
