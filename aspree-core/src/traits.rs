//! Seams for the external collaborators.
//!
//! The extractor, notifier, and blob host are out-of-process services; the
//! domain only sees these traits. Production wiring provides HTTP-backed
//! implementations; dev and tests use the local ones here.

use std::path::PathBuf;

use anyhow::Context;
use aspree_api::{
    entities::{BusinessSettings, Invoice, Product},
    models::InvoiceDraft,
};
use aspree_common::rng::SysRng;
use async_trait::async_trait;
use tracing::info;

/// The natural-language → invoice-draft extractor. Treated as a pure
/// function over the message text, the merchant's catalog, and profile.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract_invoice(
        &self,
        text: &str,
        catalog: &[Product],
        profile: Option<&BusinessSettings>,
    ) -> anyhow::Result<InvoiceDraft>;
}

/// Outbound customer notifications (rendered + delivered elsewhere).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invoice(&self, invoice: &Invoice) -> anyhow::Result<()>;
    async fn send_final_payment(
        &self,
        invoice: &Invoice,
    ) -> anyhow::Result<()>;
    async fn send_reminder(&self, invoice: &Invoice) -> anyhow::Result<()>;
}

/// A stored blob: where it is served from and the id to delete it by.
#[derive(Clone, Debug)]
pub struct BlobUpload {
    pub url: String,
    pub public_id: String,
}

/// Cloud image hosting.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `bytes` under `folder`; when `old_id` is given the previous
    /// blob may be replaced or left for a later delete.
    async fn upload(
        &self,
        bytes: &[u8],
        folder: &str,
        old_id: Option<&str>,
    ) -> anyhow::Result<BlobUpload>;

    async fn delete(&self, public_id: &str) -> anyhow::Result<()>;
}

// --- Dev implementations --- //

/// An extractor placeholder for deployments without the language-model
/// service configured; every call fails with a clear message.
pub struct UnconfiguredExtractor;

#[async_trait]
impl InvoiceExtractor for UnconfiguredExtractor {
    async fn extract_invoice(
        &self,
        _text: &str,
        _catalog: &[Product],
        _profile: Option<&BusinessSettings>,
    ) -> anyhow::Result<InvoiceDraft> {
        anyhow::bail!("Invoice extractor service is not configured")
    }
}

/// Logs instead of delivering. Used in dev and as the default wiring until
/// SMTP settings are present.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invoice(&self, invoice: &Invoice) -> anyhow::Result<()> {
        info!(invoice = %invoice.invoice_number, "notify: invoice");
        Ok(())
    }

    async fn send_final_payment(
        &self,
        invoice: &Invoice,
    ) -> anyhow::Result<()> {
        info!(invoice = %invoice.invoice_number, "notify: final payment");
        Ok(())
    }

    async fn send_reminder(&self, invoice: &Invoice) -> anyhow::Result<()> {
        info!(invoice = %invoice.invoice_number, "notify: reminder");
        Ok(())
    }
}

/// Blob storage on the local filesystem, served from `base_url`.
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, base_url: String) -> Self {
        Self { root, base_url }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        bytes: &[u8],
        folder: &str,
        _old_id: Option<&str>,
    ) -> anyhow::Result<BlobUpload> {
        let mut rng = SysRng::new();
        let name = aspree_crypto::token::random_token(&mut rng, 8);
        let public_id = format!("{folder}/{name}");

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Could not create {}", dir.display()))?;
        let path = self.root.join(&public_id);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Could not write {}", path.display()))?;

        Ok(BlobUpload {
            url: format!("{}/{public_id}", self.base_url),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        let path = self.root.join(public_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Could not delete {public_id}")),
        }
    }
}

// --- Test implementations --- //

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Returns a canned draft regardless of input.
    pub struct FixedExtractor(pub InvoiceDraft);

    #[async_trait]
    impl InvoiceExtractor for FixedExtractor {
        async fn extract_invoice(
            &self,
            _text: &str,
            _catalog: &[Product],
            _profile: Option<&BusinessSettings>,
        ) -> anyhow::Result<InvoiceDraft> {
            Ok(self.0.clone())
        }
    }

    /// Records every notification for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_invoice(
            &self,
            invoice: &Invoice,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("invoice:{}", invoice.invoice_number));
            Ok(())
        }

        async fn send_final_payment(
            &self,
            invoice: &Invoice,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("final:{}", invoice.invoice_number));
            Ok(())
        }

        async fn send_reminder(
            &self,
            invoice: &Invoice,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("reminder:{}", invoice.invoice_number));
            Ok(())
        }
    }

    /// Records uploads/deletes in memory.
    #[derive(Default)]
    pub struct RecordingBlobStore {
        pub uploads: Mutex<Vec<String>>,
        pub deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for RecordingBlobStore {
        async fn upload(
            &self,
            bytes: &[u8],
            folder: &str,
            _old_id: Option<&str>,
        ) -> anyhow::Result<BlobUpload> {
            let public_id = format!("{folder}/blob-{}", bytes.len());
            self.uploads.lock().unwrap().push(public_id.clone());
            Ok(BlobUpload {
                url: format!("https://blobs.test/{public_id}"),
                public_id,
            })
        }

        async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
            self.deletes.lock().unwrap().push(public_id.to_owned());
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn local_blob_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(
            dir.path().to_path_buf(),
            "http://localhost:3000/uploads".to_owned(),
        );

        let upload =
            store.upload(b"png-bytes", "logos", None).await.unwrap();
        assert!(upload.public_id.starts_with("logos/"));
        assert!(upload.url.contains(&upload.public_id));
        let on_disk = dir.path().join(&upload.public_id);
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"png-bytes");

        store.delete(&upload.public_id).await.unwrap();
        assert!(!on_disk.exists());
        // Deleting again is a no-op, not an error.
        store.delete(&upload.public_id).await.unwrap();
    }
}
