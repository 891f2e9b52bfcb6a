use anyhow::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the gateway's webhook signature, `t=<ts>,v1=<hex mac>`.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Holds the shared webhook secret and the URLs embedded into outbound
/// checkout links. The gateway never gets called directly; it calls us.
pub struct GatewayClient {
    webhook_secret: String,
    checkout_base_url: Url,
    success_url: String,
    cancel_url: String,
    notification_url: String,
}

impl GatewayClient {
    pub fn new(
        webhook_secret: String,
        checkout_base_url: Url,
        success_url: String,
        cancel_url: String,
        notification_url: String,
    ) -> Self {
        Self {
            webhook_secret,
            checkout_base_url,
            success_url,
            cancel_url,
            notification_url,
        }
    }

    /// Verifies the `t=...,v1=...` signature over `{timestamp}.{payload}`.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<()> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in signature header"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in signature header"))?;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(signature)?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid webhook signature");
        }

        Ok(())
    }

    /// Assembles the hosted-checkout URL with the reference and callback
    /// URLs as query parameters.
    pub fn build_checkout_url(&self, product_code: &str, reference: &str) -> Url {
        let mut url = self.checkout_base_url.clone();
        url.query_pairs_mut()
            .append_pair("product", product_code)
            .append_pair("reference", reference)
            .append_pair("redirect_success", &self.success_url)
            .append_pair("redirect_cancel", &self.cancel_url)
            .append_pair("notification_url", &self.notification_url);
        url
    }
}
