//! Git smart HTTP protocol client.
//!
//! Implements the fetch side of the smart HTTP protocol: ref discovery
//! followed by a single want/done upload-pack request.
//! See: https://git-scm.com/docs/http-protocol

use crate::pack::PACK_SIGNATURE;
use crate::pktline::{decode_all, PktLine, PktLineDecoder, PktLineWriter};
use crate::{GitError, Result};
use plumb_storage::ObjectId;

/// Service name used for fetching.
pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";
/// Content type of an upload-pack request body.
const UPLOAD_PACK_REQUEST: &str = "application/x-git-upload-pack-request";

/// Blocking HTTP transport used by the client.
pub trait Transport {
    /// Performs a GET and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Performs a POST and returns the response body.
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// [`Transport`] backed by a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Creates a transport sending the given user agent.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "GET");
        let response = self.client.get(url).send()?;
        read_body(url, response)
    }

    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        tracing::debug!(url, bytes = body.len(), "POST");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()?;
        read_body(url, response)
    }
}

fn read_body(url: &str, response: reqwest::blocking::Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(GitError::Protocol(format!("{url} returned {status}")));
    }
    Ok(response.bytes()?.to_vec())
}

/// A ref advertised by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRef {
    /// Object ID the ref points to.
    pub id: ObjectId,
    /// Full reference name, e.g. `refs/heads/main`.
    pub name: String,
}

/// The parsed response of ref discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefAdvertisement {
    /// Advertised refs in server order.
    pub refs: Vec<AdvertisedRef>,
    /// Capabilities sent after the first ref.
    pub capabilities: Vec<String>,
}

impl RefAdvertisement {
    /// Parses an `info/refs?service=git-upload-pack` response body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut advertisement = Self::default();

        for pkt in decode_all(body)? {
            let PktLine::Data(data) = pkt else {
                continue;
            };
            let line = String::from_utf8_lossy(&data);
            let line = line.trim_end_matches('\n');

            if let Some(service) = line.strip_prefix("# service=") {
                if service != UPLOAD_PACK_SERVICE {
                    return Err(GitError::Protocol(format!(
                        "unexpected service: {service}"
                    )));
                }
                continue;
            }

            let (ref_part, caps) = match line.split_once('\0') {
                Some((r, c)) => (r, Some(c)),
                None => (line, None),
            };
            if let Some(caps) = caps {
                advertisement
                    .capabilities
                    .extend(caps.split_whitespace().map(str::to_string));
            }

            let (hex, name) = ref_part
                .split_once(' ')
                .ok_or_else(|| GitError::Protocol(format!("malformed ref line: {ref_part}")))?;
            // Empty repositories advertise a placeholder; peeled tags repeat a ref.
            if name == "capabilities^{}" || name.ends_with("^{}") {
                continue;
            }
            advertisement.refs.push(AdvertisedRef {
                id: ObjectId::from_hex(hex)?,
                name: name.to_string(),
            });
        }

        Ok(advertisement)
    }

    /// Looks up a ref by full name.
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.refs.iter().find(|r| r.name == name).map(|r| r.id)
    }

    /// Returns the ref HEAD points at, from the `symref=HEAD:` capability.
    pub fn head_symref(&self) -> Option<&str> {
        self.capabilities
            .iter()
            .find_map(|cap| cap.strip_prefix("symref=HEAD:"))
    }

    /// Picks the branch to clone.
    ///
    /// An explicit branch wins, then the advertised HEAD target, then
    /// `default_branch`. Returns the branch name and its commit.
    pub fn select_branch(
        &self,
        branch: Option<&str>,
        default_branch: &str,
    ) -> Result<(String, ObjectId)> {
        let ref_name = match (branch, self.head_symref()) {
            (Some(branch), _) => format!("refs/heads/{branch}"),
            (None, Some(target)) => target.to_string(),
            (None, None) => format!("refs/heads/{default_branch}"),
        };

        let id = self
            .find(&ref_name)
            .ok_or_else(|| GitError::Protocol(format!("remote has no ref {ref_name}")))?;
        let branch = ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&ref_name)
            .to_string();
        Ok((branch, id))
    }
}

/// Encodes the upload-pack request for a single wanted commit.
pub fn want_request(want: &ObjectId) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line(&format!("want {want}"))?;
    writer.flush_pkt()?;
    writer.write_line("done")?;
    Ok(writer.into_inner())
}

/// Strips the pkt-lines preceding the pack in an upload-pack response.
pub fn extract_pack(response: &[u8]) -> Result<&[u8]> {
    let mut decoder = PktLineDecoder::new(response);
    loop {
        if decoder.remaining().starts_with(PACK_SIGNATURE) {
            return Ok(decoder.remaining());
        }
        match decoder.next_line()? {
            Some(pkt) => {
                if let Some(message) = pkt.as_str().and_then(|s| s.strip_prefix("ERR ")) {
                    return Err(GitError::Protocol(format!("remote error: {message}")));
                }
                tracing::debug!(line = ?pkt.as_str(), "upload-pack response line");
            }
            None => {
                return Err(GitError::Protocol(
                    "upload-pack response contains no pack".to_string(),
                ))
            }
        }
    }
}

/// Fetches packs from a smart HTTP remote.
pub struct UploadPackClient<'a> {
    transport: &'a dyn Transport,
    url: String,
}

impl<'a> UploadPackClient<'a> {
    /// Creates a client for the repository at `url`.
    pub fn new(transport: &'a dyn Transport, url: &str) -> Self {
        Self {
            transport,
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// Retrieves the remote's ref advertisement.
    pub fn discover_refs(&self) -> Result<RefAdvertisement> {
        let url = format!("{}/info/refs?service={UPLOAD_PACK_SERVICE}", self.url);
        let body = self.transport.get(&url)?;
        let advertisement = RefAdvertisement::parse(&body)?;
        tracing::info!(
            url = %self.url,
            refs = advertisement.refs.len(),
            head = ?advertisement.head_symref(),
            "discovered refs"
        );
        Ok(advertisement)
    }

    /// Requests a pack containing `want` and everything reachable from it.
    pub fn fetch_pack(&self, want: &ObjectId) -> Result<Vec<u8>> {
        let url = format!("{}/{UPLOAD_PACK_SERVICE}", self.url);
        let response = self
            .transport
            .post(&url, UPLOAD_PACK_REQUEST, want_request(want)?)?;
        let pack = extract_pack(&response)?.to_vec();
        tracing::info!(want = %want, bytes = pack.len(), "received pack");
        Ok(pack)
    }
}
