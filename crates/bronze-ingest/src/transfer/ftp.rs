//! FTP transport
//!
//! `suppaftp`'s blocking client runs on `spawn_blocking` workers. Downloads
//! read the data connection in fixed-size chunks and hand each chunk to the
//! async side over a bounded channel, so at most a few chunks are in memory.
//! Only session establishment (connect + login) is retried.

use crate::error::{IngestError, Result};
use crate::storage::ChunkStream;
use bytes::Bytes;
use chrono::NaiveDateTime;
use futures::StreamExt;
use rand::Rng;
use serde::Serialize;
use std::io::{self, Read};
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

pub const DEFAULT_FTP_PORT: u16 = 21;

/// Chunks buffered between the FTP reader and the uploader.
const CHANNEL_DEPTH: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct FtpSettings {
    /// Connect and read timeout.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub max_jitter: Duration,
    pub chunk_size: usize,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
            chunk_size: 4 * 1024 * 1024,
            username: "anonymous".to_string(),
            password: "anonymous@".to_string(),
        }
    }
}

/// `host[:port]/path/to/dir` as written in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpLocation {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl FtpLocation {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim().trim_start_matches("ftp://");
        let (authority, path) = match spec.split_once('/') {
            Some((authority, rest)) => (authority, format!("/{}", rest.trim_end_matches('/'))),
            None => (spec, "/".to_string()),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| IngestError::Config(format!("invalid FTP port in '{spec}'")))?;
                (host, port)
            },
            None => (authority, DEFAULT_FTP_PORT),
        };

        if host.is_empty() {
            return Err(IngestError::Config(format!("missing FTP host in '{spec}'")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: if path == "/" || path.is_empty() { "/".to_string() } else { path },
        })
    }

    /// `host/path` form recorded in the manifest.
    pub fn display_host(&self) -> String {
        format!("{}{}", self.host, self.path.trim_end_matches('/'))
    }

    pub fn url(&self, file_name: &str) -> String {
        format!("ftp://{}{}/{}", self.host, self.path.trim_end_matches('/'), file_name)
    }
}

/// `base * 2^(attempt-1) + jitter` for 1-based `attempt`.
pub fn backoff_delay(base: Duration, attempt: u32, jitter: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).saturating_add(jitter)
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

pub fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// 4xx replies are transient negative completions.
pub fn is_transient_reply(code: u32) -> bool {
    (400..500).contains(&code)
}

pub fn is_transient(err: &FtpError) -> bool {
    match err {
        FtpError::ConnectionError(io) => is_transient_io(io.kind()),
        FtpError::UnexpectedResponse(response) => is_transient_reply(response.status.code()),
        _ => false,
    }
}

/// Run `attempt` on a blocking worker, retrying transient failures with
/// exponential backoff.
pub async fn with_retry<T, F>(label: &str, settings: &FtpSettings, attempt: F) -> Result<T>
where
    T: Send + 'static,
    F: Fn() -> std::result::Result<T, FtpError> + Send + Clone + 'static,
{
    let max_attempts = settings.max_attempts.max(1);

    for n in 1..=max_attempts {
        let outcome = tokio::task::spawn_blocking(attempt.clone())
            .await
            .map_err(|e| IngestError::transfer(label, format!("FTP worker panicked: {e}")))?;

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                if n == max_attempts {
                    return Err(IngestError::TransientNetwork {
                        host: label.to_string(),
                        attempts: max_attempts,
                        message: e.to_string(),
                    });
                }
                let delay = backoff_delay(settings.base_delay, n, random_jitter(settings.max_jitter));
                warn!(
                    host = %label,
                    attempt = n,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "FTP connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(IngestError::transfer(label, e)),
        }
    }

    Err(IngestError::transfer(label, "no connection attempts made"))
}

fn open_session(location: &FtpLocation, settings: &FtpSettings) -> std::result::Result<FtpStream, FtpError> {
    let addr = (location.host.as_str(), location.port)
        .to_socket_addrs()
        .map_err(FtpError::ConnectionError)?
        .next()
        .ok_or_else(|| {
            FtpError::ConnectionError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve", location.host),
            ))
        })?;

    let mut ftp = FtpStream::connect_timeout(addr, settings.timeout)?;
    ftp.get_ref()
        .set_read_timeout(Some(settings.timeout))
        .map_err(FtpError::ConnectionError)?;
    ftp.set_mode(Mode::Passive);
    ftp.login(&settings.username, &settings.password)?;
    ftp.transfer_type(FileType::Binary)?;
    Ok(ftp)
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of stream.
pub fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn quit(mut ftp: FtpStream) {
    if let Err(e) = ftp.quit() {
        debug!(error = %e, "FTP session did not close cleanly");
    }
}

/// One remote directory.
#[derive(Debug, Clone)]
pub struct FtpClient {
    location: FtpLocation,
    settings: FtpSettings,
}

impl FtpClient {
    pub fn new(location: FtpLocation, settings: FtpSettings) -> Self {
        Self { location, settings }
    }

    pub fn location(&self) -> &FtpLocation {
        &self.location
    }

    async fn session(&self) -> Result<FtpStream> {
        let location = self.location.clone();
        let settings = self.settings.clone();
        let ftp = with_retry(&self.location.host, &self.settings, move || {
            open_session(&location, &settings)
        })
        .await?;
        debug!(host = %self.location.host, "FTP session established");
        Ok(ftp)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> std::result::Result<T, FtpError> + Send + 'static,
    {
        let mut ftp = self.session().await?;
        let dir = self.location.path.clone();
        let locator = self.location.display_host();

        tokio::task::spawn_blocking(move || {
            let result = ftp.cwd(&dir).and_then(|_| op(&mut ftp));
            quit(ftp);
            result
        })
        .await
        .map_err(|e| IngestError::transfer(&locator, format!("FTP worker panicked: {e}")))?
        .map_err(|e| IngestError::transfer(&locator, e))
    }

    /// File names in the directory (`NLST`).
    pub async fn list(&self) -> Result<Vec<String>> {
        let names = self
            .blocking(|ftp| ftp.nlst(None))
            .await?
            .into_iter()
            .map(|name| crate::storage::paths::file_name(&name).to_string())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        info!(host = %self.location.display_host(), count = names.len(), "Listed FTP directory");
        Ok(names)
    }

    /// `MDTM` for each name over one session. A name whose time cannot be
    /// read is logged and reported as `None`.
    pub async fn modified_times(&self, names: Vec<String>) -> Result<Vec<(String, Option<NaiveDateTime>)>> {
        let host = self.location.display_host();
        self.blocking(move |ftp| {
            Ok(names
                .into_iter()
                .map(|name| match ftp.mdtm(&name) {
                    Ok(time) => (name, Some(time)),
                    Err(e) => {
                        warn!(host = %host, file = %name, error = %e, "Cannot read modification time, skipping");
                        (name, None)
                    },
                })
                .collect())
        })
        .await
    }

    /// Stream one file (`RETR`) as chunks of at most `chunk_size` bytes.
    pub async fn stream(&self, name: &str) -> Result<ChunkStream> {
        let mut ftp = self.session().await?;
        let dir = self.location.path.clone();
        let name = name.to_string();
        let chunk_size = self.settings.chunk_size.max(1);
        let timeout = self.settings.timeout;
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            let result = retrieve(&mut ftp, &dir, &name, chunk_size, timeout, &tx);
            quit(ftp);
            if let Err(e) = result {
                // receiver may already be gone
                let _ = tx.blocking_send(Err(io::Error::other(format!("RETR {name}: {e}"))));
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn retrieve(
    ftp: &mut FtpStream,
    dir: &str,
    name: &str,
    chunk_size: usize,
    timeout: Duration,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> std::result::Result<(), FtpError> {
    ftp.cwd(dir)?;
    let mut reader = ftp.retr_as_stream(name)?;
    reader
        .get_ref()
        .set_read_timeout(Some(timeout))
        .map_err(FtpError::ConnectionError)?;

    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = read_chunk(&mut reader, &mut buf).map_err(FtpError::ConnectionError)?;
        if n == 0 {
            break;
        }
        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
            debug!(file = %name, "Upload side closed, abandoning RETR");
            return Ok(());
        }
    }

    ftp.finalize_retr_stream(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_location() {
        let loc = FtpLocation::parse("ftp.ncbi.nlm.nih.gov/pub/clinvar/tab_delimited/").unwrap();
        assert_eq!(loc.host, "ftp.ncbi.nlm.nih.gov");
        assert_eq!(loc.port, 21);
        assert_eq!(loc.path, "/pub/clinvar/tab_delimited");
        assert_eq!(loc.display_host(), "ftp.ncbi.nlm.nih.gov/pub/clinvar/tab_delimited");
        assert_eq!(
            loc.url("variant_summary.txt.gz"),
            "ftp://ftp.ncbi.nlm.nih.gov/pub/clinvar/tab_delimited/variant_summary.txt.gz"
        );

        let loc = FtpLocation::parse("ftp://localhost:2121").unwrap();
        assert_eq!(loc.port, 2121);
        assert_eq!(loc.path, "/");

        assert!(FtpLocation::parse("host:abc/x").is_err());
        assert!(FtpLocation::parse("/only/path").is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1, Duration::ZERO), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2, Duration::ZERO), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 5, Duration::from_millis(500)), Duration::from_millis(32_500));
        assert!(random_jitter(Duration::from_secs(1)) <= Duration::from_secs(1));
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient_io(io::ErrorKind::ConnectionReset));
        assert!(is_transient_io(io::ErrorKind::TimedOut));
        assert!(!is_transient_io(io::ErrorKind::PermissionDenied));
        assert!(is_transient_reply(421));
        assert!(!is_transient_reply(530));
        assert!(!is_transient_reply(226));

        let err = FtpError::ConnectionError(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(is_transient(&err));
    }

    #[test]
    fn test_read_chunk_fills_buffer() {
        let data = vec![7u8; 10];
        let mut reader = io::Cursor::new(data);
        let mut buf = [0u8; 4];
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    fn fast_settings(max_attempts: u32) -> FtpSettings {
        FtpSettings {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            ..FtpSettings::default()
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let value = with_retry("ftp.example.org", &fast_settings(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FtpError::ConnectionError(io::Error::from(io::ErrorKind::ConnectionReset)))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = with_retry("ftp.example.org", &fast_settings(3), move || -> std::result::Result<(), FtpError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FtpError::ConnectionError(io::Error::from(io::ErrorKind::TimedOut)))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::TransientNetwork { attempts: 3, .. }));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = with_retry("ftp.example.org", &fast_settings(5), move || -> std::result::Result<(), FtpError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FtpError::ConnectionError(io::Error::from(io::ErrorKind::PermissionDenied)))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Transfer { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[ignore = "requires network access to ftp.ncbi.nlm.nih.gov"]
    async fn live_listing() {
        let location = FtpLocation::parse("ftp.ncbi.nlm.nih.gov/pub/clinvar/tab_delimited").unwrap();
        let client = FtpClient::new(location, FtpSettings::default());
        let names = client.list().await.unwrap();
        assert!(names.iter().any(|n| n.starts_with("variant_summary")));
    }
}
