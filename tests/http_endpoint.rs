use std::{
    io::{Cursor, Read, Write},
    net::{SocketAddr, TcpListener},
    thread::{self, JoinHandle},
    time::Duration,
};

use image::{ImageFormat, Rgba, RgbaImage};
use now_playing_accent::{
    artwork::{decode_artwork, ArtworkError, ArtworkFetcher, HttpArtworkFetcher},
    poller::{HttpStatusSource, PollError, StatusSource},
    status::PlaybackStatus,
};

struct Canned {
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

/// Answers one connection per canned response and returns the request lines seen.
fn serve(responses: Vec<Canned>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for canned in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let text = String::from_utf8_lossy(&request);
            seen.push(text.lines().next().unwrap_or_default().to_owned());

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                canned.status,
                canned.content_type,
                canned.body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&canned.body).unwrap();
            stream.flush().unwrap();
        }
        seen
    });

    (addr, handle)
}

fn json(status: &'static str, body: &str) -> Canned {
    Canned {
        status,
        content_type: "application/json",
        body: body.as_bytes().to_vec(),
    }
}

#[test]
fn status_source_handles_playing_idle_and_errors() {
    let (addr, server) = serve(vec![
        json(
            "200 OK",
            r#"{"is_playing": true, "item": {"name": "Song A", "artists": [{"name": "Artist X"}], "album": {"images": [{"url": "img1.png"}]}}}"#,
        ),
        json("204 No Content", ""),
        json("500 Internal Server Error", "{}"),
        json("200 OK", "not json"),
    ]);
    let source = HttpStatusSource::new(
        format!("http://{addr}/currently-playing"),
        Duration::from_secs(5),
    )
    .unwrap();

    let playing = source.fetch_status().unwrap();
    let track = playing.playing_track().unwrap();
    assert_eq!(track.title, "Song A");
    assert_eq!(track.artist_line(), "Artist X");

    assert_eq!(source.fetch_status().unwrap(), PlaybackStatus::idle());
    assert!(matches!(source.fetch_status(), Err(PollError::Http(_))));
    assert!(matches!(source.fetch_status(), Err(PollError::Payload(_))));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen
        .iter()
        .all(|line| line.starts_with("GET /currently-playing ")));
}

#[test]
fn artwork_fetcher_resolves_relative_urls_against_endpoint() {
    let image = RgbaImage::from_pixel(3, 3, Rgba([12, 200, 100, 255]));
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png).unwrap();

    let (addr, server) = serve(vec![
        Canned {
            status: "200 OK",
            content_type: "image/png",
            body: png.into_inner(),
        },
        json("404 Not Found", ""),
    ]);
    let fetcher = HttpArtworkFetcher::new(
        Some(&format!("http://{addr}/currently-playing")),
        Duration::from_secs(5),
    )
    .unwrap();

    let bytes = fetcher.fetch_bytes("img1.png").unwrap();
    assert_eq!(decode_artwork(&bytes).unwrap().dimensions(), (3, 3));
    assert!(matches!(
        fetcher.fetch_bytes("missing.png"),
        Err(ArtworkError::Request { .. })
    ));

    let seen = server.join().unwrap();
    assert!(seen[0].starts_with("GET /img1.png "));
    assert!(seen[1].starts_with("GET /missing.png "));
}
