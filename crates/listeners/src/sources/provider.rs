//! Builds endpoint URLs from `rpc[source]` provider entries.

use attestor_types::config::{RpcProviderConfig, RpcProviderKind};
use attestor_types::error::OracleError;

/// Resolves one provider entry to a full endpoint URL.
pub fn endpoint_url(provider: &RpcProviderConfig) -> Result<String, OracleError> {
    match provider.kind {
        RpcProviderKind::Alchemy => {
            let chain = require(provider, "chain", provider.chain.as_deref())?;
            let key = require(provider, "apiKey", provider.api_key.as_deref())?;
            Ok(format!("https://{chain}.g.alchemy.com/v2/{key}"))
        }
        RpcProviderKind::Infura => {
            let chain = require(provider, "chain", provider.chain.as_deref())?;
            let key = require(provider, "apiKey", provider.api_key.as_deref())?;
            Ok(format!("https://{chain}.infura.io/v3/{key}"))
        }
        RpcProviderKind::Ankr => {
            let chain = require(provider, "chain", provider.chain.as_deref())?;
            match provider.api_key.as_deref() {
                Some(key) => Ok(format!("https://rpc.ankr.com/{chain}/{key}")),
                None => Ok(format!("https://rpc.ankr.com/{chain}")),
            }
        }
        // QuickNode endpoints embed their token in the hostname, so the
        // whole URL comes from config, same as the raw json kind.
        RpcProviderKind::Quicknode | RpcProviderKind::Json => {
            require(provider, "url", provider.url.as_deref()).map(str::to_string)
        }
    }
}

/// Resolves a whole provider pool, keeping the configured order.
pub fn endpoint_urls(providers: &[RpcProviderConfig]) -> Result<Vec<String>, OracleError> {
    if providers.is_empty() {
        return Err(OracleError::Config("empty rpc provider list".into()));
    }
    providers.iter().map(endpoint_url).collect()
}

fn require<'a>(
    provider: &RpcProviderConfig,
    field: &str,
    value: Option<&'a str>,
) -> Result<&'a str, OracleError> {
    value.ok_or_else(|| {
        OracleError::Config(format!("rpc provider {:?} is missing {field}", provider.kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: RpcProviderKind) -> RpcProviderConfig {
        RpcProviderConfig {
            kind,
            chain: Some("eth-mainnet".into()),
            api_key: Some("k3y".into()),
            url: Some("https://node.example/abc".into()),
        }
    }

    #[test]
    fn hosted_providers_build_from_chain_and_key() {
        assert_eq!(
            endpoint_url(&entry(RpcProviderKind::Alchemy)).unwrap(),
            "https://eth-mainnet.g.alchemy.com/v2/k3y"
        );
        assert_eq!(
            endpoint_url(&entry(RpcProviderKind::Infura)).unwrap(),
            "https://eth-mainnet.infura.io/v3/k3y"
        );
        assert_eq!(
            endpoint_url(&entry(RpcProviderKind::Ankr)).unwrap(),
            "https://rpc.ankr.com/eth-mainnet/k3y"
        );
    }

    #[test]
    fn url_providers_pass_through() {
        assert_eq!(
            endpoint_url(&entry(RpcProviderKind::Json)).unwrap(),
            "https://node.example/abc"
        );
        assert_eq!(
            endpoint_url(&entry(RpcProviderKind::Quicknode)).unwrap(),
            "https://node.example/abc"
        );
    }

    #[test]
    fn missing_fields_are_config_errors() {
        let mut provider = entry(RpcProviderKind::Alchemy);
        provider.api_key = None;
        assert!(endpoint_url(&provider).is_err());

        let mut provider = entry(RpcProviderKind::Json);
        provider.url = None;
        assert!(endpoint_url(&provider).is_err());
    }
}
