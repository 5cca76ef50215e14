//! In-memory WebDAV server.
//!
//! [`MemoryDav`] plugs into the transport's [`DavClient`] seam and answers
//! requests the way a typical WebDAV share does:
//!
//! | Method   | Outcome                                                     |
//! |----------|-------------------------------------------------------------|
//! | PROPFIND | 207 if the resource exists, 404 otherwise                   |
//! | MKCOL    | 201, 405 if it already exists, 409 if the parent is missing |
//! | PUT      | 201 new / 204 replaced, 409 if the parent is missing        |
//! | GET      | 200 with the body, 404 otherwise                            |
//! | DELETE   | 204, 404 if missing                                         |
//!
//! Tests can additionally force statuses, take the server offline, require
//! credentials and pause a method mid-flight.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ledgervault_webdav::{DavClient, DavMethod, DavRequest, DavResponse};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Endpoint URL served by [`MemoryDav`].
pub const ENDPOINT: &str = "http://dav.test/dav";

#[derive(Default)]
struct Server {
    files: BTreeMap<String, Vec<u8>>,
    collections: BTreeSet<String>,
    log: Vec<(DavMethod, String)>,
    overrides: HashMap<(DavMethod, String), u16>,
    offline: bool,
    authorization: Option<String>,
}

impl Server {
    fn exists(&self, path: &str) -> bool {
        path.is_empty() || self.collections.contains(path) || self.files.contains_key(path)
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.collections.contains(parent),
            None => true,
        }
    }

    fn handle(&mut self, method: DavMethod, path: &str, body: Vec<u8>) -> DavResponse {
        match method {
            DavMethod::Propfind if self.exists(path) => DavResponse::status(207),
            DavMethod::Propfind => DavResponse::status(404),
            DavMethod::Mkcol if self.exists(path) => DavResponse::status(405),
            DavMethod::Mkcol if !self.parent_exists(path) => DavResponse::status(409),
            DavMethod::Mkcol => {
                self.collections.insert(path.to_string());
                DavResponse::status(201)
            }
            DavMethod::Put if !self.parent_exists(path) => DavResponse::status(409),
            DavMethod::Put => match self.files.insert(path.to_string(), body) {
                Some(_) => DavResponse::status(204),
                None => DavResponse::status(201),
            },
            DavMethod::Get => match self.files.get(path) {
                Some(data) => DavResponse::with_body(200, data.clone()),
                None => DavResponse::status(404),
            },
            DavMethod::Delete => {
                let prefix = format!("{path}/");
                let removed_file = self.files.remove(path).is_some();
                let removed_dir = self.collections.remove(path);
                if removed_dir {
                    self.files.retain(|p, _| !p.starts_with(&prefix));
                    self.collections.retain(|p| !p.starts_with(&prefix));
                }
                if removed_file || removed_dir {
                    DavResponse::status(204)
                } else {
                    DavResponse::status(404)
                }
            }
        }
    }
}

#[derive(Default)]
struct Gate {
    method: Option<DavMethod>,
    waiting: bool,
}

#[derive(Default)]
struct Shared {
    server: Mutex<Server>,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
}

/// In-memory WebDAV server. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDav {
    shared: Arc<Shared>,
}

impl MemoryDav {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects requests whose Basic credentials differ from these with 401.
    pub fn require_credentials(&self, username: &str, secret: &str) {
        let token = STANDARD.encode(format!("{username}:{secret}"));
        self.shared.server.lock().authorization = Some(format!("Basic {token}"));
    }

    /// Makes every request fail without a response.
    pub fn set_offline(&self, offline: bool) {
        self.shared.server.lock().offline = offline;
    }

    /// Answers `method` on `path` with `status` instead of the normal outcome.
    pub fn fail_with(&self, method: DavMethod, path: &str, status: u16) {
        self.shared
            .server
            .lock()
            .overrides
            .insert((method, path.to_string()), status);
    }

    /// Removes all forced statuses.
    pub fn clear_failures(&self) {
        self.shared.server.lock().overrides.clear();
    }

    /// Stores a file directly, creating its parent collections.
    pub fn put_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut server = self.shared.server.lock();
        let mut parent = String::new();
        if let Some((dirs, _)) = path.rsplit_once('/') {
            for segment in dirs.split('/') {
                if !parent.is_empty() {
                    parent.push('/');
                }
                parent.push_str(segment);
                server.collections.insert(parent.clone());
            }
        }
        server.files.insert(path.to_string(), data.into());
    }

    /// Returns the content of a stored file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.server.lock().files.get(path).cloned()
    }

    /// Returns true if `path` is a collection.
    pub fn has_collection(&self, path: &str) -> bool {
        self.shared.server.lock().collections.contains(path)
    }

    /// Returns every request received so far as (method, path).
    pub fn requests(&self) -> Vec<(DavMethod, String)> {
        self.shared.server.lock().log.clone()
    }

    /// Returns how many requests used `method`.
    pub fn count(&self, method: DavMethod) -> usize {
        self.shared
            .server
            .lock()
            .log
            .iter()
            .filter(|(m, _)| *m == method)
            .count()
    }

    /// Forgets the request log.
    pub fn clear_log(&self) {
        self.shared.server.lock().log.clear();
    }

    /// Holds every `method` request until [`MemoryDav::release`] is called.
    pub fn pause(&self, method: DavMethod) {
        self.shared.gate.lock().method = Some(method);
    }

    /// Lets paused requests continue.
    pub fn release(&self) {
        let mut gate = self.shared.gate.lock();
        gate.method = None;
        self.shared.gate_changed.notify_all();
    }

    /// Waits until a request is held by [`MemoryDav::pause`].
    ///
    /// Returns false on timeout.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.shared.gate.lock();
        while !gate.waiting {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.shared.gate_changed.wait_for(&mut gate, deadline - now);
        }
        true
    }

    fn hold(&self, method: DavMethod) {
        let mut gate = self.shared.gate.lock();
        if gate.method != Some(method) {
            return;
        }
        gate.waiting = true;
        self.shared.gate_changed.notify_all();
        while gate.method == Some(method) {
            self.shared.gate_changed.wait(&mut gate);
        }
        gate.waiting = false;
    }
}

impl DavClient for MemoryDav {
    fn send(&self, request: DavRequest) -> Result<DavResponse, String> {
        let path = path_of(&request.url)
            .ok_or_else(|| format!("unknown host in {}", request.url))?;

        {
            let mut server = self.shared.server.lock();
            server.log.push((request.method, path.clone()));
            if server.offline {
                return Err("connection refused".to_string());
            }
        }

        self.hold(request.method);

        let mut server = self.shared.server.lock();
        if let Some(expected) = &server.authorization {
            if request.header_value("Authorization") != Some(expected.as_str()) {
                return Ok(DavResponse::status(401));
            }
        }
        if let Some(status) = server.overrides.get(&(request.method, path.clone())) {
            return Ok(DavResponse::status(*status));
        }
        Ok(server.handle(request.method, &path, request.body))
    }
}

/// Maps a request URL to a server path such as `"LedgerVault/data.lvsnap"`.
fn path_of(url: &str) -> Option<String> {
    let rest = url.strip_prefix(ENDPOINT)?;
    Some(percent_decode(rest.trim_matches('/')))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let decoded = (bytes[i] == b'%')
            .then(|| input.get(i + 1..i + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match decoded {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgervault_webdav::WebDavClient;
    use std::thread;

    fn client(dav: &MemoryDav) -> WebDavClient<MemoryDav> {
        WebDavClient::new(ENDPOINT, "user", "secret", dav.clone()).unwrap()
    }

    #[test]
    fn collection_and_file_lifecycle() {
        let dav = MemoryDav::new();
        let remote = client(&dav);

        assert!(!remote.exists("Backups"));
        assert!(remote.put("Backups/a.bin", vec![1], "application/octet-stream").is_err());
        remote.make_collection("Backups").unwrap();
        remote.make_collection("Backups").unwrap();
        remote.put("Backups/a.bin", vec![1, 2], "application/octet-stream").unwrap();

        assert!(remote.exists("Backups/a.bin"));
        assert_eq!(remote.get("Backups/a.bin").unwrap(), vec![1, 2]);
        remote.delete("Backups").unwrap();
        assert!(dav.file("Backups/a.bin").is_none());
    }

    #[test]
    fn encoded_paths_are_decoded() {
        let dav = MemoryDav::new();
        let remote = client(&dav);
        remote.make_collection("My Backups").unwrap();
        assert!(dav.has_collection("My Backups"));
    }

    #[test]
    fn credentials_are_checked() {
        let dav = MemoryDav::new();
        dav.require_credentials("user", "other");
        let err = client(&dav).probe("").unwrap_err();
        assert_eq!(err.status_code(), Some(401));

        dav.require_credentials("user", "secret");
        assert!(client(&dav).probe("").is_ok());
    }

    #[test]
    fn forced_status_and_offline() {
        let dav = MemoryDav::new();
        dav.put_file("x", vec![0]);
        dav.fail_with(DavMethod::Get, "x", 500);
        assert_eq!(client(&dav).get("x").unwrap_err().status_code(), Some(500));

        dav.clear_failures();
        dav.set_offline(true);
        assert_eq!(client(&dav).get("x").unwrap_err().status_code(), None);
    }

    #[test]
    fn paused_request_waits_for_release() {
        let dav = MemoryDav::new();
        dav.pause(DavMethod::Put);

        let remote = client(&dav);
        let worker = thread::spawn(move || remote.put("f", vec![7], "text/plain"));

        assert!(dav.wait_until_paused(Duration::from_secs(5)));
        assert!(dav.file("f").is_none());
        dav.release();
        worker.join().unwrap().unwrap();
        assert_eq!(dav.file("f"), Some(vec![7]));
    }
}
