//! Ranking client: fetches the ordered score table over HTTP.

use crate::domain::ScoreResponse;
use crate::error::ClientError;

/// Reads the ranking table from the scoring service.
#[derive(Debug, Clone)]
pub struct RankingClient {
    http: reqwest::Client,
    url: String,
}

impl RankingClient {
    /// Creates a client for the ranking endpoint at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Ranking endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the ranking, best position first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Ranking`] if the request fails, the service
    /// answers with a non-success status, or the body is not a JSON array
    /// of scores.
    pub async fn fetch_ranking(&self) -> Result<Vec<ScoreResponse>, ClientError> {
        let ranking: Vec<ScoreResponse> = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(url = %self.url, entries = ranking.len(), "ranking fetched");
        Ok(ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_endpoint() {
        let client = RankingClient::new("http://localhost:9090/ranking/position");
        assert_eq!(client.url(), "http://localhost:9090/ranking/position");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_ranking_error() {
        let client = RankingClient::new("http://127.0.0.1:9/ranking/position");
        let err = tokio_test::assert_err!(client.fetch_ranking().await);
        assert_eq!(err.error_code(), 4001);
        assert!(err.is_recoverable());
    }
}
