use reqwest::header::AUTHORIZATION;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use super::{read_json, ApiError, OctopusClient};
use crate::domain::{AccountTariffs, Tariff};

const OBTAIN_TOKEN_MUTATION: &str = r#"
mutation obtainKrakenToken($key: String!) {
  obtainKrakenToken(input: {APIKey: $key}) {
    token
  }
}
"#;

const ACCOUNT_TARIFFS_QUERY: &str = r#"
query account($account: String!) {
  account(accountNumber: $account) {
    number
    electricityAgreements {
      tariff {
        ... on StandardTariff {
          displayName
          fullName
          productCode
          tariffCode
          standingCharge
          unitRate
        }
      }
    }
    gasAgreements {
      tariff {
        displayName
        fullName
        productCode
        tariffCode
        standingCharge
        unitRate
      }
    }
  }
}
"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObtainTokenData {
    obtain_kraken_token: Option<TokenPayload>,
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

#[derive(Deserialize)]
struct AccountData {
    account: Option<AccountNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountNode {
    #[serde(default)]
    electricity_agreements: Option<Vec<Agreement>>,
    #[serde(default)]
    gas_agreements: Option<Vec<Agreement>>,
}

#[derive(Deserialize)]
struct Agreement {
    tariff: Option<Tariff>,
}

// A null agreement list means no supply of that kind.
fn tariffs_of(agreements: Option<Vec<Agreement>>) -> Vec<Tariff> {
    agreements.unwrap_or_default().into_iter().filter_map(|a| a.tariff).collect()
}

impl OctopusClient {
    /// Fetch the tariffs of every gas and electricity agreement on an account.
    ///
    /// Exchanges the API key for a short-lived token first; the token is not
    /// cached between calls.
    pub async fn fetch_tariffs(&self, account_number: &str) -> Result<AccountTariffs, ApiError> {
        let token = self.obtain_token().await?;

        let data: AccountData = self
            .graphql(
                ACCOUNT_TARIFFS_QUERY,
                json!({ "account": account_number }),
                Some(&token),
            )
            .await?;

        let account = data
            .account
            .ok_or_else(|| ApiError::GraphQl(format!("account {account_number} missing from response")))?;

        let tariffs = AccountTariffs {
            account_number: account_number.to_string(),
            electricity: tariffs_of(account.electricity_agreements),
            gas: tariffs_of(account.gas_agreements),
        };
        tracing::debug!(
            electricity = tariffs.electricity.len(),
            gas = tariffs.gas.len(),
            "fetched account tariffs"
        );

        Ok(tariffs)
    }

    async fn obtain_token(&self) -> Result<String, ApiError> {
        let data: ObtainTokenData = self
            .graphql(OBTAIN_TOKEN_MUTATION, json!({ "key": self.api_key }), None)
            .await?;

        data.obtain_kraken_token
            .map(|payload| payload.token)
            .ok_or_else(|| ApiError::GraphQl("obtainKrakenToken returned no token".to_string()))
    }

    async fn graphql<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        token: Option<&str>,
    ) -> Result<D, ApiError> {
        let url = &self.graphql_url;
        let mut request = self.http.post(url).json(&GraphQlRequest { query, variables });
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;

        let body: GraphQlResponse<D> = read_json(url, response).await.map_err(|e| match e {
            ApiError::Decode { source, .. } => ApiError::GraphQl(format!("unexpected response shape: {source}")),
            other => other,
        })?;

        let errors = body.errors.unwrap_or_default();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| ApiError::GraphQl("response has no data".to_string()))
    }
}
