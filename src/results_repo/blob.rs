// BLOB version prefix helpers. [version: u8][wincode payload].
// pre/post snapshots and container usage all use version 1.

use anyhow::anyhow;

pub(super) const BLOB_VERSION: u8 = 1;

pub(super) fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte. A blob written under another version is an error,
/// not a guess.
pub(super) fn blob_payload(bytes: &[u8], expected_version: u8) -> anyhow::Result<&[u8]> {
    match bytes.split_first() {
        Some((v, rest)) if *v == expected_version => Ok(rest),
        Some((v, _)) => Err(anyhow!(
            "unsupported blob version {} (expected {})",
            v,
            expected_version
        )),
        None => Err(anyhow!("empty blob")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_then_strip() {
        let blob = with_version_prefix(BLOB_VERSION, vec![7, 8, 9]);
        assert_eq!(blob, vec![BLOB_VERSION, 7, 8, 9]);
        assert_eq!(blob_payload(&blob, BLOB_VERSION).unwrap(), &[7, 8, 9]);
    }

    #[test]
    fn wrong_version_or_empty_is_error() {
        assert!(blob_payload(&[9, 1], BLOB_VERSION).is_err());
        assert!(blob_payload(&[], BLOB_VERSION).is_err());
    }
}
