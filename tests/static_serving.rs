//! End-to-end exercise of `Builder`/`Server` against a real socket: a static route
//! backed by a temp directory, served over a plain TCP connection.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wsgi_boost::Builder;

#[test]
fn serves_a_static_file_and_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hello from disk").unwrap();

    let server = Arc::new(
        Builder::new()
            .worker_threads(1)
            .use_gzip(false)
            .build("127.0.0.1:0")
            .unwrap(),
    );
    server.add_static_route("^/static/", dir.path()).unwrap();

    let handle = server.handle();
    let running = Arc::clone(&server);
    let join = thread::spawn(move || running.start());

    let addr = wait_for(|| server.local_addr());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET /static/hello.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    stream.shutdown(std::net::Shutdown::Write).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("hello from disk"));

    handle.stop(true);
    join.join().unwrap().unwrap();
}

fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(v) = poll() {
            return v;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition never became true");
}
