use jsonrpsee::{
    http_client::{HttpClient, HttpClientBuilder},
    proc_macros::rpc,
    types::ErrorObjectOwned,
};
use url::Url;

/// Wire contract of the object-storage URL-signing service: storage key
/// in, time-limited readable URL out. The service itself is opaque.
#[rpc(client)]
pub trait SignerApi {
    #[method(name = "signUrl")]
    async fn sign_url(&self, storage_key: String, expiry_secs: u64)
        -> Result<String, ErrorObjectOwned>;
}

#[allow(async_fn_in_trait)]
pub trait UrlSigner {
    async fn sign_url(&self, storage_key: &str) -> anyhow::Result<Url>;
}

#[derive(Clone)]
pub struct RemoteSigner {
    client: HttpClient,
    expiry_secs: u64,
}

impl RemoteSigner {
    pub fn new(signer_url: Url, timeout_secs: u64, expiry_secs: u64) -> anyhow::Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(std::time::Duration::from_secs(timeout_secs))
            .build(signer_url)?;
        Ok(Self {
            client,
            expiry_secs,
        })
    }
}

impl UrlSigner for RemoteSigner {
    async fn sign_url(&self, storage_key: &str) -> anyhow::Result<Url> {
        let signed =
            SignerApiClient::sign_url(&self.client, storage_key.to_string(), self.expiry_secs)
                .await
                .map_err(|e| anyhow::anyhow!("signer request failed: {:#}", e))?;
        Url::parse(&signed).map_err(Into::into)
    }
}
