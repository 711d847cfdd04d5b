//! Pull protocol tests against an in-memory registry.

use flate2::write::GzEncoder;
use flate2::Compression;
use pretty_assertions::assert_eq;
use provgate_registry::*;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

const REPO: &str = "team/tool";
const BASE: &str = "https://registry-1.docker.io/v2/team/tool";

// ================================================================
// Fake registry
// ================================================================

#[derive(Default)]
struct FakeRegistry {
    json: HashMap<String, Value>,
    blobs: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
    tokens_seen: RefCell<Vec<Option<String>>>,
}

impl FakeRegistry {
    fn new() -> Self {
        let mut fake = Self::default();
        fake.json.insert(
            RegistryConfig::default().token_url(REPO),
            json!({"token": "t0k3n"}),
        );
        fake
    }

    fn manifest(mut self, reference: &str, doc: Value) -> Self {
        self.json.insert(format!("{BASE}/manifests/{reference}"), doc);
        self
    }

    /// Registers a blob and returns its layer descriptor.
    fn blob(&mut self, data: Vec<u8>) -> Value {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&data)));
        self.blobs.insert(format!("{BASE}/blobs/{digest}"), data);
        json!({"digest": digest, "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip"})
    }

    fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    fn blob_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|u| u.contains("/blobs/"))
            .collect()
    }
}

impl RegistryTransport for FakeRegistry {
    fn get_json(
        &self,
        url: &str,
        token: Option<&str>,
        _accept: Option<&str>,
    ) -> Result<Value, RegistryError> {
        self.requests.borrow_mut().push(url.to_string());
        self.tokens_seen.borrow_mut().push(token.map(str::to_string));
        self.json
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::Http(format!("HTTP 404 Not Found fetching {url}")))
    }

    fn get_bytes(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>, RegistryError> {
        self.requests.borrow_mut().push(url.to_string());
        self.tokens_seen.borrow_mut().push(token.map(str::to_string));
        self.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::Http(format!("HTTP 404 Not Found fetching {url}")))
    }
}

fn layer_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    let tar = builder.into_inner().unwrap();
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&tar).unwrap();
    enc.finish().unwrap()
}

fn manifest_list() -> Value {
    json!({
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {"digest": "sha256:amd", "platform": {"architecture": "amd64", "os": "linux"}},
            {"digest": "sha256:arm", "platform": {"architecture": "arm64", "os": "linux"}},
        ]
    })
}

fn image_manifest(layers: Vec<Value>) -> Value {
    json!({
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": layers,
    })
}

fn client(fake: FakeRegistry, machine: &str) -> RegistryClient<FakeRegistry> {
    RegistryClient::new(fake, RegistryConfig::default()).with_machine(machine)
}

fn image() -> ImageReference {
    ImageReference::new(REPO, "latest")
}

/// Four layers; the binary lives only in the third.
fn four_layer_registry() -> FakeRegistry {
    let mut fake = FakeRegistry::new();
    let layers = vec![
        fake.blob(layer_tar(&[("etc/os-release", b"ID=alpine")])),
        fake.blob(layer_tar(&[("usr/lib/libc.so", b"lib")])),
        fake.blob(layer_tar(&[("./tool", b"third-layer-binary")])),
        fake.blob(layer_tar(&[("tool", b"fourth-layer-binary")])),
    ];
    fake.manifest("latest", manifest_list())
        .manifest("sha256:arm", image_manifest(layers))
}

// ================================================================
// Happy path
// ================================================================

#[test]
fn third_of_four_layers_wins_and_fourth_is_never_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bin/tool");
    let client = client(four_layer_registry(), "aarch64");

    let pulled = client.pull(&image(), &dest, None).unwrap();

    assert_eq!(pulled.layer_index, 2);
    assert_eq!(pulled.entry_name, "tool");
    assert_eq!(std::fs::read(&dest).unwrap(), b"third-layer-binary");
    assert_eq!(client.transport().blob_requests().len(), 3);
}

#[test]
fn protocol_sequence_and_token_use() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(four_layer_registry(), "arm64");
    client.pull(&image(), &dir.path().join("tool"), None).unwrap();

    let requests = client.transport().requests();
    assert_eq!(requests[0], RegistryConfig::default().token_url(REPO));
    assert_eq!(requests[1], format!("{BASE}/manifests/latest"));
    assert_eq!(requests[2], format!("{BASE}/manifests/sha256:arm"));

    let tokens = client.transport().tokens_seen.borrow().clone();
    assert_eq!(tokens[0], None);
    assert!(tokens[1..].iter().all(|t| t.as_deref() == Some("t0k3n")));
}

#[cfg(unix)]
#[test]
fn installed_binary_is_executable() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("tool");
    client(four_layer_registry(), "aarch64")
        .pull(&image(), &dest, None)
        .unwrap();
    let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn single_platform_manifest_skips_selection() {
    let mut fake = FakeRegistry::new();
    let layer = fake.blob(layer_tar(&[("tool-entrypoint", b"#!/bin/sh")]));
    let fake = fake.manifest("latest", image_manifest(vec![layer]));
    let dir = tempfile::tempdir().unwrap();
    let client = client(fake, "x86_64");

    let pulled = client.pull(&image(), &dir.path().join("-tool"), None).unwrap();

    assert_eq!(pulled.entry_name, "tool-entrypoint");
    let manifests = client
        .transport()
        .requests()
        .iter()
        .filter(|u| u.contains("/manifests/"))
        .count();
    assert_eq!(manifests, 1);
}

#[test]
fn explicit_candidates_override_defaults() {
    let mut fake = FakeRegistry::new();
    let layer = fake.blob(layer_tar(&[("usr/bin/real-name", b"ELF")]));
    let fake = fake.manifest("latest", image_manifest(vec![layer]));
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("tool");

    let names = vec!["usr/bin/real-name".to_string()];
    let pulled = client(fake, "x86_64").pull(&image(), &dest, Some(&names)).unwrap();
    assert_eq!(pulled.entry_name, "usr/bin/real-name");
    assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");
}

#[test]
fn malformed_layer_is_skipped() {
    let mut fake = FakeRegistry::new();
    let layers = vec![
        fake.blob(b"{\"config\": \"not a tarball\"}".repeat(40)),
        fake.blob(layer_tar(&[("tool", b"ok")])),
    ];
    let fake = fake.manifest("latest", image_manifest(layers));
    let dir = tempfile::tempdir().unwrap();

    let pulled = client(fake, "x86_64")
        .pull(&image(), &dir.path().join("tool"), None)
        .unwrap();
    assert_eq!(pulled.layer_index, 1);
}

#[test]
fn layer_with_oversized_header_is_skipped() {
    let mut header = tar::Header::new_gnu();
    header.set_path("tool").unwrap();
    header.set_size(u64::MAX / 2);
    header.set_mode(0o755);
    header.set_cksum();
    let mut hostile = header.as_bytes().to_vec();
    hostile.extend_from_slice(&[0u8; 1024]);

    let mut fake = FakeRegistry::new();
    let layers = vec![fake.blob(hostile), fake.blob(layer_tar(&[("tool", b"ok")]))];
    let fake = fake.manifest("latest", image_manifest(layers));
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("tool");

    let pulled = client(fake, "x86_64").pull(&image(), &dest, None).unwrap();
    assert_eq!(pulled.layer_index, 1);
    assert_eq!(std::fs::read(&dest).unwrap(), b"ok");
}

// ================================================================
// Failures
// ================================================================

#[test]
fn unsupported_architecture_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(four_layer_registry(), "mips");
    let err = client.pull(&image(), &dir.path().join("tool"), None).unwrap_err();
    assert!(matches!(err, RegistryError::UnsupportedArchitecture(ref m) if m == "mips"));
    assert!(client.transport().requests().is_empty());
}

#[test]
fn missing_platform_is_manifest_not_found() {
    let fake = FakeRegistry::new().manifest(
        "latest",
        json!({"manifests": [
            {"digest": "sha256:arm", "platform": {"architecture": "arm64", "os": "linux"}}
        ]}),
    );
    let dir = tempfile::tempdir().unwrap();
    let client = client(fake, "x86_64");
    let err = client.pull(&image(), &dir.path().join("tool"), None).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::ManifestNotFound { ref architecture, .. } if architecture == "amd64"
    ));
    assert!(client.transport().blob_requests().is_empty());
}

#[test]
fn token_failure_is_auth_error() {
    let mut fake = FakeRegistry::new().manifest("latest", manifest_list());
    fake.json.insert(
        RegistryConfig::default().token_url(REPO),
        json!({"details": "denied"}),
    );
    let dir = tempfile::tempdir().unwrap();
    let err = client(fake, "x86_64")
        .pull(&image(), &dir.path().join("tool"), None)
        .unwrap_err();
    assert!(matches!(err, RegistryError::Auth { ref repository, .. } if repository == REPO));

    let mut unreachable = FakeRegistry::new();
    unreachable.json.clear();
    let err = client(unreachable, "x86_64")
        .pull(&image(), &dir.path().join("tool"), None)
        .unwrap_err();
    assert!(matches!(err, RegistryError::Auth { .. }));
}

#[test]
fn official_namespace_only_applies_to_docker_hub() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nginx");
    let nginx = ImageReference::new("nginx", "latest");

    let hub = client(FakeRegistry::new(), "x86_64");
    assert!(hub.pull(&nginx, &dest, None).is_err());
    assert!(hub.transport().requests()[0].contains("scope=repository:library/nginx:pull"));

    let private = RegistryConfig {
        registry_url: "https://registry.example.com".into(),
        auth_url: "https://registry.example.com/token".into(),
        ..RegistryConfig::default()
    };
    let client = RegistryClient::new(FakeRegistry::new(), private).with_machine("x86_64");
    assert!(client.pull(&nginx, &dest, None).is_err());
    assert!(client.transport().requests()[0].contains("scope=repository:nginx:pull"));
}

#[test]
fn binary_absent_from_every_layer() {
    let mut fake = FakeRegistry::new();
    let layers = vec![
        fake.blob(layer_tar(&[("a", b"1")])),
        fake.blob(layer_tar(&[("b", b"2")])),
    ];
    let fake = fake.manifest("latest", image_manifest(layers));
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("tool");

    let client = client(fake, "x86_64");
    let err = client.pull(&image(), &dest, None).unwrap_err();
    match err {
        RegistryError::BinaryNotFound { image, candidates } => {
            assert_eq!(image, "team/tool:latest");
            assert_eq!(candidates, vec!["tool", "tool-entrypoint"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.transport().blob_requests().len(), 2);
    assert_no_files(dir.path());
}

#[test]
fn corrupted_blob_fails_with_digest_mismatch() {
    let mut fake = FakeRegistry::new();
    let layer = fake.blob(layer_tar(&[("tool", b"good")]));
    let url = format!("{BASE}/blobs/{}", layer["digest"].as_str().unwrap());
    fake.blobs.insert(url, layer_tar(&[("tool", b"evil")]));
    let fake = fake.manifest("latest", image_manifest(vec![layer]));
    let dir = tempfile::tempdir().unwrap();

    let err = client(fake, "x86_64")
        .pull(&image(), &dir.path().join("tool"), None)
        .unwrap_err();
    assert!(matches!(err, RegistryError::DigestMismatch { .. }));
    assert_no_files(dir.path());
}

#[test]
fn layer_download_error_propagates() {
    let mut fake = FakeRegistry::new();
    let layer = fake.blob(layer_tar(&[("tool", b"x")]));
    fake.blobs.clear();
    let fake = fake.manifest("latest", image_manifest(vec![layer]));
    let dir = tempfile::tempdir().unwrap();

    let err = client(fake, "x86_64")
        .pull(&image(), &dir.path().join("tool"), None)
        .unwrap_err();
    assert!(matches!(err, RegistryError::Http(_)));
}

fn assert_no_files(dir: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}
