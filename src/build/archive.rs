//! Byte-reproducible tar.gz packaging. Two builds of the same file map
//! produce identical bytes, so the sha256 doubles as an HTTP cache validator.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};

/// Build the archive and its sha256 hex in one go.
pub fn build(files: &BTreeMap<String, String>) -> Result<(Vec<u8>, String)> {
    let bytes = tar_gz(files)?;
    let sha = sha256_hex(&bytes);
    Ok((bytes, sha))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// BTreeMap iteration gives lexicographic path order; every header carries
/// zeroed mtime/uid/gid and a fixed mode, and the gzip envelope a zero mtime.
fn tar_gz(files: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let gz = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::new(6));
    let mut tar = tar::Builder::new(gz);

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        tar.append_data(&mut header, path, content.as_bytes())
            .with_context(|| format!("archive entry {}", path))?;
    }

    let gz = tar.into_inner().context("finalize tar stream")?;
    let bytes = gz.finish().context("finalize gzip stream")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn identical_input_yields_identical_bytes() {
        let m = files(&[
            ("etc/config/system", "config system\n"),
            ("etc/config/network", "config interface\n"),
        ]);
        let (a, sha_a) = build(&m).unwrap();
        let (b, sha_b) = build(&m).unwrap();
        assert_eq!(a, b);
        assert_eq!(sha_a, sha_b);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = files(&[("b", "2"), ("a", "1")]);
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());
        assert_eq!(build(&a).unwrap().1, build(&b).unwrap().1);
    }

    #[test]
    fn content_change_changes_hash() {
        let a = files(&[("etc/x", "one")]);
        let b = files(&[("etc/x", "two")]);
        assert_ne!(build(&a).unwrap().1, build(&b).unwrap().1);
    }

    #[test]
    fn sha_is_lowercase_hex() {
        let (_, sha) = build(&files(&[("etc/x", "y")])).unwrap();
        assert_eq!(sha.len(), 64);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn archive_round_trips() {
        let m = files(&[("etc/config/system", "config system 'system'\n")]);
        let (bytes, _) = build(&m).unwrap();

        let gz = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut ar = tar::Archive::new(gz);
        let mut seen = Vec::new();
        for entry in ar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = String::new();
            std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
            assert_eq!(entry.header().mtime().unwrap(), 0);
            seen.push((path, content));
        }
        assert_eq!(seen, vec![(
            "etc/config/system".to_string(),
            "config system 'system'\n".to_string()
        )]);
    }
}
