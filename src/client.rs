use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::estimator::{GasEstimate, TransactionRecord};

const ESTIMATE_PATH: &str = "estimate_gas_price";
const TRANSACTIONS_PATH: &str = "transactions";

/// Remote calls the estimator depends on.
#[async_trait]
pub trait GasSource: Send + Sync {
    async fn estimate_gas_price(&self) -> Result<GasEstimate, FetchError>;

    /// The `limit` most recent transactions, oldest first.
    async fn recent_transactions(&self, limit: usize)
    -> Result<Vec<TransactionRecord>, FetchError>;
}

/// HTTP client for a node's REST API.
pub struct NodeClient {
    base_url: Url,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.endpoint(path)?;
        debug!(%url, ?query, "GET");
        let resp = self.http.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl GasSource for NodeClient {
    async fn estimate_gas_price(&self) -> Result<GasEstimate, FetchError> {
        self.get_json(ESTIMATE_PATH, &[]).await
    }

    async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, FetchError> {
        self.get_json(TRANSACTIONS_PATH, &[("limit", limit.to_string())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> NodeClient {
        let base = Url::parse(&format!("{}/v1/", server.uri())).unwrap();
        NodeClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn reads_gas_estimate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/estimate_gas_price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deprioritized_gas_estimate": 100,
                "gas_estimate": 100,
                "prioritized_gas_estimate": 150
            })))
            .mount(&server)
            .await;

        let estimate = client_for(&server).estimate_gas_price().await.unwrap();
        assert_eq!(estimate.gas_estimate, 100);
        assert_eq!(estimate.prioritized_gas_estimate, Some(150));
        assert_eq!(estimate.deprioritized_gas_estimate, Some(100));
    }

    #[tokio::test]
    async fn requests_transactions_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "type": "block_metadata_transaction", "version": "1" },
                { "type": "user_transaction", "gas_unit_price": "100", "gas_used": "12" },
                { "type": "state_checkpoint_transaction", "gas_used": "0" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = client_for(&server).recent_transactions(10).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].unit_price(), Some(100));
        assert_eq!(records[2].unit_price(), None);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/estimate_gas_price"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).estimate_gas_price().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/estimate_gas_price"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).estimate_gas_price().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let client = NodeClient::new(
            Url::parse("https://node.example/v1/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("/transactions").unwrap().as_str(),
            "https://node.example/v1/transactions"
        );
        assert_eq!(client.base_url().host_str(), Some("node.example"));
    }
}
