//! HTTP mocking for webhook delivery tests.
//!
//! Wraps a wiremock server behind the small surface the dispatcher tests
//! need: configure responses, then inspect what arrived.

use std::time::Duration;

use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

/// Path the receiver listens on; anything else gets a 404.
const HOOK_PATH: &str = "/hooks/pages";

/// A webhook destination that records every delivery it receives.
pub struct WebhookReceiver {
    server: MockServer,
}

impl WebhookReceiver {
    /// Starts a receiver on a random local port with no responses
    /// configured; call one of the `respond_*` methods before dispatching.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Full URL to hand to the dispatcher configuration.
    pub fn endpoint(&self) -> String {
        format!("{}{HOOK_PATH}", self.server.uri())
    }

    /// Accepts every delivery with a 200.
    pub async fn respond_ok(&self) {
        self.respond_with(200).await;
    }

    /// Answers every delivery with the given status.
    pub async fn respond_with(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Fails the first `failures` deliveries with `failure_status`, then
    /// accepts the rest. Earlier mounts win until their allowance runs
    /// out, so the order of the two mounts matters.
    pub async fn fail_then_accept(&self, failures: u64, failure_status: u16) {
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(ResponseTemplate::new(failure_status))
            .up_to_n_times(failures)
            .mount(&self.server)
            .await;

        self.respond_ok().await;
    }

    /// Holds every response for `delay` before answering 200. Pair with a
    /// short dispatcher timeout to simulate a dead destination.
    pub async fn respond_slow(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Everything received so far, in arrival order.
    pub async fn received(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of deliveries received so far.
    pub async fn request_count(&self) -> usize {
        self.received().await.len()
    }

    /// Polls until `expected` deliveries arrived or the timeout passes.
    ///
    /// Dispatch runs on a spawned task, so tests driving the HTTP handler
    /// cannot assert the count synchronously.
    pub async fn wait_for_requests(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.request_count().await >= expected {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Asserts that a delivery carries a valid signature for `secret`.
pub fn assert_signed(request: &Request, secret: &str) {
    let header = request
        .headers
        .get(spb_delivery::SIGNATURE_HEADER)
        .unwrap_or_else(|| panic!("{} header missing", spb_delivery::SIGNATURE_HEADER))
        .to_str()
        .expect("signature header is not valid UTF-8");

    let expected = spb_delivery::sign_payload(secret, &request.body).expect("signing failed");

    assert_eq!(header, expected, "signature does not match the body");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receiver_records_deliveries() {
        let receiver = WebhookReceiver::start().await;
        receiver.respond_ok().await;

        let client = reqwest::Client::new();
        let response = client.post(receiver.endpoint()).body("{}").send().await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(receiver.request_count().await, 1);
    }

    #[tokio::test]
    async fn failure_allowance_runs_out() {
        let receiver = WebhookReceiver::start().await;
        receiver.fail_then_accept(2, 503).await;

        let client = reqwest::Client::new();
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = client.post(receiver.endpoint()).send().await.unwrap();
            statuses.push(response.status().as_u16());
        }

        assert_eq!(statuses, vec![503, 503, 200]);
    }
}
