use std::sync::Once;
use tracing::debug;

static INIT_CRYPTO: Once = Once::new();

/// Installs aws-lc-rs as the process wide rustls crypto provider.
///
/// The BigQuery HTTP client looks the provider up at runtime, so this must run before the first
/// client is built. A provider installed by someone else is kept.
pub fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("a rustls crypto provider was already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        install_crypto_provider();
        install_crypto_provider();

        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
