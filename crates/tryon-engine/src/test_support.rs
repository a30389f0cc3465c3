//! Loopback HTTP stub for exercising the network paths.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;

/// One request as the stub saw it.
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub(crate) head: String,
    pub(crate) body: Vec<u8>,
}

impl CapturedRequest {
    pub(crate) fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

enum Reply {
    Respond {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    /// Reads the request, then holds the connection open without answering.
    Stall(Duration),
}

pub(crate) struct StubServer {
    addr: SocketAddr,
    requests: mpsc::Receiver<CapturedRequest>,
    listener: TcpListener,
}

impl StubServer {
    pub(crate) fn respond(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self::spawn(vec![Reply::Respond {
            status,
            content_type,
            body: body.into(),
        }])
    }

    pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
        Self::respond(status, "application/json", body.to_string())
    }

    pub(crate) fn stall(hold: Duration) -> Self {
        Self::spawn(vec![Reply::Stall(hold)])
    }

    /// Answers successive connections with `replies`, in order.
    pub(crate) fn script(replies: Vec<(u16, &'static str, Vec<u8>)>) -> Self {
        Self::spawn(
            replies
                .into_iter()
                .map(|(status, content_type, body)| Reply::Respond {
                    status,
                    content_type,
                    body,
                })
                .collect(),
        )
    }

    fn spawn(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener addr");
        let worker = listener.try_clone().expect("clone stub listener");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for reply in replies {
                let Ok((mut stream, _)) = worker.accept() else {
                    return;
                };
                let Some(captured) = read_request(&mut stream) else {
                    return;
                };
                let _ = tx.send(captured);
                answer(&mut stream, reply);
            }
        });
        Self {
            addr,
            requests: rx,
            listener,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub(crate) fn received(&self) -> Option<CapturedRequest> {
        self.requests.recv_timeout(Duration::from_secs(5)).ok()
    }

    /// True when no client has connected yet.
    pub(crate) fn untouched(&self) -> bool {
        if self.listener.set_nonblocking(true).is_err() {
            return false;
        }
        let untouched = matches!(
            self.listener.accept(),
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock
        ) && self.requests.try_recv().is_err();
        let _ = self.listener.set_nonblocking(false);
        untouched
    }
}

pub(crate) fn http_client() -> HttpClient {
    HttpClient::builder()
        .no_proxy()
        .build()
        .expect("build test http client")
}

fn answer(stream: &mut TcpStream, reply: Reply) {
    match reply {
        Reply::Respond {
            status,
            content_type,
            body,
        } => {
            let head = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
        Reply::Stall(hold) => thread::sleep(hold),
    }
}

fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok()?;
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    let head_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos;
        }
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..read]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    Some(CapturedRequest { head, body })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
