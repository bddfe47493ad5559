// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Session behaviour against a scripted router on an in-memory stream

use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use routeros_api::{
    ApiError, ApiMetrics, Client, ClientOptions, CloseReason, LoginMethod, RequestOutcome,
    RouterConfig, Sentence, SentenceFramer, Session, SessionOptions, SessionState, Tag,
    TagSequence,
};

/// Router side of a duplex stream
struct MockRouter {
    stream: DuplexStream,
    framer: SentenceFramer,
}

impl MockRouter {
    async fn recv(&mut self) -> Sentence {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(sentence) = self.framer.next_sentence().unwrap() {
                return sentence;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "session hung up");
            self.framer.feed(&buf[..n]);
        }
    }

    async fn send(&mut self, words: &[&str]) {
        let frame = Sentence::from_words(words).to_bytes().unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn reply(&mut self, tag: Tag, words: &[&str]) {
        let tag_word = format!(".tag={tag}");
        let mut all: Vec<&str> = words.to_vec();
        all.push(&tag_word);
        self.send(&all).await;
    }
}

fn words(sentence: &Sentence) -> Vec<String> {
    sentence
        .words()
        .iter()
        .map(|w| String::from_utf8_lossy(w).into_owned())
        .collect()
}

/// Words of a request without its trailing `.tag`
fn command(sentence: &Sentence) -> Vec<String> {
    let mut words = words(sentence);
    let last = words.pop().unwrap();
    assert!(last.starts_with(".tag="), "last word was {last}");
    words
}

fn tag_of(sentence: &Sentence) -> Tag {
    sentence.tag().expect("request carries a tag")
}

fn pair(options: SessionOptions) -> (Session, MockRouter) {
    pair_sized(options, 64 * 1024)
}

/// Like [`pair`], with `buffer` bytes of room in each direction
fn pair_sized(options: SessionOptions, buffer: usize) -> (Session, MockRouter) {
    let (client, server) = tokio::io::duplex(buffer);
    let session = Session::with_options(client, options);
    let router = MockRouter {
        stream: server,
        framer: SentenceFramer::new(),
    };
    (session, router)
}

/// Router half of a successful challenge login for admin/api123
async fn accept_challenge_login(router: &mut MockRouter) -> (Tag, Tag) {
    let first = router.recv().await;
    assert_eq!(command(&first), ["/login"]);
    let first_tag = tag_of(&first);
    router.reply(first_tag, &["!done", "=ret=1234"]).await;

    let second = router.recv().await;
    assert_eq!(
        command(&second),
        [
            "/login",
            "=name=admin",
            "=response=006e7874d9301baf8fab24f739cb9267a7"
        ]
    );
    let second_tag = tag_of(&second);
    router.reply(second_tag, &["!done"]).await;
    (first_tag, second_tag)
}

async fn ready_pair(options: SessionOptions) -> (Session, MockRouter) {
    ready_pair_sized(options, 64 * 1024).await
}

async fn ready_pair_sized(options: SessionOptions, buffer: usize) -> (Session, MockRouter) {
    let (session, mut router) = pair_sized(options, buffer);
    let (login, _) = tokio::join!(
        session.login("admin", "api123"),
        accept_challenge_login(&mut router)
    );
    login.unwrap();
    (session, router)
}

#[tokio::test]
async fn test_challenge_login() {
    let (session, mut router) = pair(SessionOptions::default());
    assert_eq!(session.state(), SessionState::Connecting);

    let (login, tags) = tokio::join!(
        session.login("admin", "api123"),
        accept_challenge_login(&mut router)
    );

    login.unwrap();
    assert_eq!(tags, (1, 2));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_plain_login() {
    let (session, mut router) = pair(SessionOptions::default());

    let (login, ()) = tokio::join!(
        session.login_with("admin", "secret", LoginMethod::Plain),
        async {
            let request = router.recv().await;
            assert_eq!(
                command(&request),
                ["/login", "=name=admin", "=password=secret"]
            );
            router.reply(tag_of(&request), &["!done"]).await;
        }
    );

    login.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_login_rejected_closes_session() {
    let (session, mut router) = pair(SessionOptions::default());

    let (login, ()) = tokio::join!(session.login("admin", "wrong"), async {
        let first = router.recv().await;
        router.reply(tag_of(&first), &["!done", "=ret=1234"]).await;
        let second = router.recv().await;
        router
            .reply(
                tag_of(&second),
                &["!trap", "=message=invalid user name or password (6)"],
            )
            .await;
    });

    match login.unwrap_err() {
        ApiError::AuthenticationFailed(message) => {
            assert_eq!(message, "invalid user name or password (6)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        session.state(),
        SessionState::Closed(CloseReason::AuthenticationFailed)
    );
    let err = session.query(&["/system/resource/print"]).await.unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed));
}

#[tokio::test]
async fn test_second_login_is_rejected() {
    let (session, _router) = ready_pair(SessionOptions::default()).await;
    let err = session.login("admin", "api123").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(SessionState::Ready)));
}

#[tokio::test]
async fn test_concurrent_queries_get_their_own_results() {
    const N: usize = 8;
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let queries = (0..N).map(|i| {
        let session = session.clone();
        async move {
            let words = ["/interface/print".to_string(), format!("?name=ether{i}")];
            (i, session.query(&words).await)
        }
    });

    let (results, ()) = tokio::join!(join_all(queries), async {
        let mut requests = Vec::new();
        for _ in 0..N {
            requests.push(router.recv().await);
        }
        let mut tags: Vec<Tag> = requests.iter().map(tag_of).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), N, "tags must be unique");

        // answer in reverse, interleaving rows of different requests
        for request in requests.iter().rev() {
            let filter = command(request)[1].clone();
            let name = filter.trim_start_matches("?name=").to_string();
            let id = format!("=.id=*{}", tag_of(request));
            let name_word = format!("=name={name}");
            router
                .reply(tag_of(request), &["!re", id.as_str(), name_word.as_str()])
                .await;
        }
        for request in &requests {
            router.reply(tag_of(request), &["!done"]).await;
        }
    });

    for (i, result) in results {
        let indexed = result.unwrap();
        assert_eq!(indexed.len(), 1);
        let row = indexed.values().next().unwrap();
        assert_eq!(row["name"], format!("ether{i}"));
    }
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_fatal_fails_every_pending_request() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let queries = (0..3).map(|_| {
        let session = session.clone();
        async move { session.query(&["/log/print", "=follow="]).await }
    });

    let (results, ()) = tokio::join!(join_all(queries), async {
        for _ in 0..3 {
            router.recv().await;
        }
        router
            .send(&["!fatal", "session terminated on request"])
            .await;
    });

    for result in results {
        match result.unwrap_err() {
            ApiError::Fatal(message) => assert_eq!(message, "session terminated on request"),
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(
        session.closed().await,
        CloseReason::Fatal("session terminated on request".to_string())
    );
    let err = session.query(&["/interface/print"]).await.unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed));
}

#[tokio::test]
async fn test_rows_indexed_by_id_or_tag() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query(&["/ip/address/print"]), async {
        let request = router.recv().await;
        // login used tags 1 and 2
        assert_eq!(tag_of(&request), 3);
        router
            .send(&["!re", "=.id=*1", "=address=10.0.0.1/24", ".tag=3"])
            .await;
        router
            .send(&["!re", "=address=10.0.0.2/24", ".tag=3"])
            .await;
        router.send(&["!done", ".tag=3"]).await;
    });

    let indexed = result.unwrap();
    let keys: Vec<&str> = indexed.keys().map(String::as_str).collect();
    assert_eq!(keys, ["1", "tag-3"]);
    assert_eq!(indexed["1"]["address"], "10.0.0.1/24");
    assert_eq!(indexed["tag-3"]["address"], "10.0.0.2/24");
}

#[tokio::test]
async fn test_query_rows_keeps_every_row() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query_rows(&["/ip/route/print"]), async {
        let request = router.recv().await;
        let tag = tag_of(&request);
        router.reply(tag, &["!re", "=dst-address=0.0.0.0/0"]).await;
        router.reply(tag, &["!re", "=dst-address=10.0.0.0/8"]).await;
        router.reply(tag, &["!done"]).await;
    });

    let rows = result.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["dst-address"], "0.0.0.0/0");
    assert_eq!(rows[1]["dst-address"], "10.0.0.0/8");
}

#[tokio::test]
async fn test_trap_only_fails_its_own_request() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (bad, good, ()) = tokio::join!(
        session.query(&["/no/such/command"]),
        session.query(&["/system/identity/print"]),
        async {
            let mut requests = vec![router.recv().await, router.recv().await];
            requests.sort_by_key(|r| command(r)[0].clone());
            let (bad, good) = (&requests[0], &requests[1]);
            assert_eq!(command(bad), ["/no/such/command"]);

            router
                .reply(tag_of(bad), &["!trap", "=message=no such command"])
                .await;
            router
                .reply(tag_of(good), &["!re", "=name=MikroTik"])
                .await;
            router.reply(tag_of(good), &["!done"]).await;
        }
    );

    match bad.unwrap_err() {
        ApiError::Trap { message, .. } => assert_eq!(message, "no such command"),
        other => panic!("unexpected error: {other}"),
    }
    let identity = good.unwrap();
    assert_eq!(identity.values().next().unwrap()["name"], "MikroTik");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_replies_for_unknown_tags_are_dropped() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query(&["/system/clock/print"]), async {
        let request = router.recv().await;
        router.send(&["!re", "=time=00:00:00", ".tag=99"]).await;
        router.send(&["!done", ".tag=99"]).await;
        router.send(&["!done"]).await;
        router.reply(tag_of(&request), &["!re", "=time=12:00:00"]).await;
        router.reply(tag_of(&request), &["!done"]).await;
    });

    let clock = result.unwrap();
    assert_eq!(clock.len(), 1);
    assert_eq!(clock.values().next().unwrap()["time"], "12:00:00");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_timed_out_query_is_deregistered() {
    let metrics = ApiMetrics::new();
    let options = SessionOptions {
        observer: Some(metrics.observer("mock")),
        ..SessionOptions::default()
    };
    let (session, mut router) = ready_pair(options).await;

    let limit = Duration::from_millis(50);
    let err = session
        .query_timeout(&["/tool/ping", "=address=10.0.0.1"], limit)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(d) if d == limit));

    let late = router.recv().await;
    router.reply(tag_of(&late), &["!re", "=status=timeout"]).await;
    router.reply(tag_of(&late), &["!done"]).await;

    let (result, ()) = tokio::join!(session.query(&["/system/identity/print"]), async {
        let request = router.recv().await;
        router.reply(tag_of(&request), &["!re", "=name=core"]).await;
        router.reply(tag_of(&request), &["!done"]).await;
    });
    assert_eq!(result.unwrap().values().next().unwrap()["name"], "core");

    assert_eq!(metrics.pending("mock"), 0);
    assert_eq!(metrics.requests_finished("mock", RequestOutcome::Cancelled), 1);
    // two login steps plus the identity query
    assert_eq!(metrics.requests_finished("mock", RequestOutcome::Completed), 3);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_shared_tag_sequence_across_sessions() {
    let tags = TagSequence::new();
    let options = SessionOptions {
        tags: tags.clone(),
        ..SessionOptions::default()
    };

    let (first, _router) = ready_pair(options.clone()).await;
    first.close().await;

    let (second, mut router) = pair(options);
    let (login, used) = tokio::join!(
        second.login("admin", "api123"),
        accept_challenge_login(&mut router)
    );
    login.unwrap();
    assert_eq!(used, (3, 4));
    assert_eq!(tags.peek(), 5);
}

#[tokio::test]
async fn test_corrupt_stream_closes_session() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query(&["/interface/print"]), async {
        router.recv().await;
        router.stream.write_all(&[0xF8, 0, 0, 0, 0]).await.unwrap();
    });

    assert!(matches!(
        result.unwrap_err(),
        ApiError::ProtocolCorruption(_)
    ));
    assert!(matches!(
        session.closed().await,
        CloseReason::Corruption(_)
    ));
}

#[tokio::test]
async fn test_oversized_inbound_word_closes_session() {
    let options = SessionOptions {
        max_word_len: 1024,
        ..SessionOptions::default()
    };
    let (session, mut router) = ready_pair(options).await;

    let (result, ()) = tokio::join!(session.query(&["/interface/print"]), async {
        let request = router.recv().await;
        let long = format!("=comment={}", "x".repeat(2048));
        router.reply(tag_of(&request), &["!re", long.as_str()]).await;
    });

    assert!(matches!(
        result.unwrap_err(),
        ApiError::ProtocolCorruption(_)
    ));
    assert!(matches!(
        session.closed().await,
        CloseReason::Corruption(_)
    ));
}

#[tokio::test]
async fn test_large_request_and_reply_cross_on_small_buffer() {
    let (session, mut router) = ready_pair_sized(SessionOptions::default(), 1024).await;
    let value = "x".repeat(200_000);
    let comment = format!("=comment={value}");

    let exchange = async {
        let rows = {
            let session = session.clone();
            tokio::spawn(async move { session.query_rows(&["/interface/print"]).await })
        };
        let first = router.recv().await;
        assert_eq!(command(&first), ["/interface/print"]);

        // queued while the router is still writing the large row below
        let set = {
            let session = session.clone();
            let comment = comment.clone();
            tokio::spawn(async move { session.query(&["/system/note/set", comment.as_str()]).await })
        };
        let row = format!("=note={value}");
        router.reply(tag_of(&first), &["!re", row.as_str()]).await;
        router.reply(tag_of(&first), &["!done"]).await;

        let second = router.recv().await;
        assert_eq!(command(&second), ["/system/note/set", comment.as_str()]);
        router.reply(tag_of(&second), &["!done"]).await;

        (rows.await.unwrap(), set.await.unwrap())
    };
    let (rows, set) = tokio::time::timeout(Duration::from_secs(5), exchange)
        .await
        .expect("exchange finished in time");

    let rows = rows.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note").map(String::len), Some(200_000));
    assert!(set.unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_router_hangup_fails_pending_requests() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query(&["/interface/print"]), async {
        router.recv().await;
        router.stream.shutdown().await.unwrap();
    });

    assert!(matches!(result.unwrap_err(), ApiError::Io(_)));
    assert!(matches!(session.closed().await, CloseReason::Transport(_)));
}

#[tokio::test]
async fn test_local_close_fails_pending_requests() {
    let (session, mut router) = ready_pair(SessionOptions::default()).await;

    let (result, ()) = tokio::join!(session.query(&["/log/print", "=follow="]), async {
        router.recv().await;
        session.close().await;
    });

    assert!(matches!(result.unwrap_err(), ApiError::ConnectionClosed));
    assert_eq!(session.state(), SessionState::Closed(CloseReason::Local));
}

#[tokio::test]
async fn test_client_over_stream() {
    let config = RouterConfig {
        name: "lab".to_string(),
        address: "192.0.2.1".to_string(),
        port: 8728,
        username: "admin".to_string(),
        password: "secret".to_string(),
        login_method: LoginMethod::Plain,
    };
    let metrics = ApiMetrics::new();
    let mut options = ClientOptions::default();
    options.session.observer = Some(metrics.observer("lab"));

    let (stream, server) = tokio::io::duplex(64 * 1024);
    let mut router = MockRouter {
        stream: server,
        framer: SentenceFramer::new(),
    };

    let (client, ()) = tokio::join!(Client::over_stream(config, stream, options), async {
        let login = router.recv().await;
        router.reply(tag_of(&login), &["!done"]).await;
    });
    let client = client.unwrap();
    assert_eq!(client.name(), "lab");

    let (result, ()) = tokio::join!(client.query(&["/interface/print"]), async {
        let request = router.recv().await;
        let tag = tag_of(&request);
        router.reply(tag, &["!re", "=.id=*A", "=name=ether1"]).await;
        router.reply(tag, &["!re", "=.id=*B", "=name=ether2"]).await;
        router.reply(tag, &["!done"]).await;
    });
    let interfaces = result.unwrap();
    assert_eq!(interfaces["A"]["name"], "ether1");
    assert_eq!(interfaces["B"]["name"], "ether2");

    let session = client.session().clone();
    client.close().await;
    assert_eq!(session.state(), SessionState::Closed(CloseReason::Local));
    assert_eq!(metrics.requests_sent("lab"), 2);
    assert_eq!(metrics.sessions_closed("lab"), 1);

    let text = metrics.encode_metrics().await.unwrap();
    assert!(text.contains("routeros_api_sentences_received_total{router=\"lab\",reply=\"re\"} 2"));
}

#[tokio::test]
async fn test_client_rejects_invalid_config() {
    let config = RouterConfig {
        name: "broken".to_string(),
        address: String::new(),
        port: 8728,
        username: "admin".to_string(),
        password: String::new(),
        login_method: LoginMethod::Challenge,
    };
    let err = Client::connect(config).await.err().unwrap();
    assert!(matches!(err, ApiError::Config(_)));
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let (a, _router_a) = ready_pair(SessionOptions::default()).await;
    let (b, _router_b) = ready_pair(SessionOptions::default()).await;
    a.close().await;

    assert!(a.state().is_closed());
    assert_eq!(b.state(), SessionState::Ready);
}
