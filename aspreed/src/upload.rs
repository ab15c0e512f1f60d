//! Payment-confirmation upload validation and storage.
//!
//! Accepted types: JPEG, PNG, GIF, PDF, validated by magic bytes rather
//! than the client-declared content type. Size bounds are inclusive:
//! 1 KiB <= size <= 10 MiB. Files are stored under
//! `uploads/payment-confirmations/` with per-invoice unique names and are
//! only ever served through authenticated or tokenized routes.

use std::path::{Path, PathBuf};

use aspree_api::{error::ApiError, types::ids::InvoiceId};
use aspree_common::rng::SysRng;

pub const MIN_UPLOAD_BYTES: usize = 1024;
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const CONFIRMATIONS_DIR: &str = "payment-confirmations";

/// Validate size and sniff the content type; returns the file extension.
pub fn validate_confirmation_file(
    bytes: &[u8],
) -> Result<&'static str, ApiError> {
    if bytes.len() < MIN_UPLOAD_BYTES {
        return Err(ApiError::validation(
            "File is too small (minimum 1 KiB)",
        ));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::validation(
            "File is too large (maximum 10 MiB)",
        ));
    }
    sniff_extension(bytes).ok_or_else(|| {
        ApiError::validation(
            "Unsupported file type; use JPEG, PNG, GIF, or PDF",
        )
    })
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.starts_with(b"%PDF") {
        Some("pdf")
    } else {
        None
    }
}

/// Store a validated proof under the per-invoice unique name. Returns the
/// path relative to the upload root, as recorded on the invoice.
pub async fn save_confirmation(
    upload_root: &Path,
    invoice_id: &InvoiceId,
    bytes: &[u8],
    extension: &str,
) -> Result<String, ApiError> {
    let mut rng = SysRng::new();
    let discriminator = aspree_crypto::token::random_token(&mut rng, 6);
    let relative = format!(
        "{CONFIRMATIONS_DIR}/{invoice_id}-{discriminator}.{extension}"
    );

    let dir: PathBuf = upload_root.join(CONFIRMATIONS_DIR);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        ApiError::internal(format!("Could not create upload dir: {e}"))
    })?;
    tokio::fs::write(upload_root.join(&relative), bytes)
        .await
        .map_err(|e| {
            ApiError::internal(format!("Could not store upload: {e}"))
        })?;

    Ok(relative)
}

/// Minimal valid fixture bytes for each accepted type, padded to `len`.
#[cfg(test)]
pub(crate) fn test_file(magic: &[u8], len: usize) -> Vec<u8> {
    let mut bytes = magic.to_vec();
    bytes.resize(len, 0);
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn size_boundaries_are_inclusive() {
        // 1023 rejected, 1024 accepted.
        assert!(validate_confirmation_file(&test_file(PNG, 1023)).is_err());
        assert_eq!(
            validate_confirmation_file(&test_file(PNG, 1024)).unwrap(),
            "png"
        );
        // 10 MiB accepted, one byte over rejected.
        assert_eq!(
            validate_confirmation_file(&test_file(PNG, MAX_UPLOAD_BYTES))
                .unwrap(),
            "png"
        );
        assert!(validate_confirmation_file(&test_file(
            PNG,
            MAX_UPLOAD_BYTES + 1
        ))
        .is_err());
    }

    #[test]
    fn sniffing_accepts_the_four_types_only() {
        assert_eq!(
            validate_confirmation_file(&test_file(
                &[0xFF, 0xD8, 0xFF, 0xE0],
                2048
            ))
            .unwrap(),
            "jpg"
        );
        assert_eq!(
            validate_confirmation_file(&test_file(b"GIF89a", 2048)).unwrap(),
            "gif"
        );
        assert_eq!(
            validate_confirmation_file(&test_file(b"%PDF-1.7", 2048))
                .unwrap(),
            "pdf"
        );
        // An executable or random blob is rejected regardless of size.
        assert!(
            validate_confirmation_file(&test_file(b"MZ\x90\x00", 2048))
                .is_err()
        );
    }

    #[tokio::test]
    async fn save_uses_per_invoice_unique_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let invoice_id = InvoiceId::generate();
        let bytes = test_file(PNG, 2048);

        let first = save_confirmation(dir.path(), &invoice_id, &bytes, "png")
            .await
            .unwrap();
        let second =
            save_confirmation(dir.path(), &invoice_id, &bytes, "png")
                .await
                .unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("payment-confirmations/"));
        assert!(dir.path().join(&first).exists());
        assert!(dir.path().join(&second).exists());
    }
}
