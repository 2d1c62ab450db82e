use super::*;
use crate::buffer::BufferPool;
use crate::buffer::testing::{chain_from, pool};
use indoc::indoc;
use proptest::prelude::*;

/// Feeds `input` through the parser, stepping over intermediate actions.
fn run(config: &ServerConfig, input: &[u8]) -> (Action, usize, RequestParser) {
    let mut parser = RequestParser::new(config);
    let mut consumed = 0;
    loop {
        let (action, count) = parser.parse(&input[consumed..]);
        consumed += count;
        match action {
            Action::CheckHeaders | Action::ContinueAction if consumed < input.len() => {}
            _ => return (action, consumed, parser),
        }
    }
}

fn status_of(config: &ServerConfig, input: &[u8]) -> Action {
    run(config, input).0
}

fn parse_request(pool: &BufferPool, input: &[u8]) -> (Action, Request) {
    let (action, _, parser) = run(&ServerConfig::default(), input);
    (action, parser.into_request(chain_from(pool, input)))
}

#[test]
fn simple_get() {
    let input = b"GET /a?x=1 HTTP/1.1\r\nHost: h\r\n\r\n";
    let (action, consumed, parser) = run(&ServerConfig::default(), input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(consumed, input.len());
    let request = parser.request();
    assert_eq!(request.method(), Method::GET);
    assert_eq!(request.path(), "/a");
    assert_eq!(request.query(), "x=1");
    assert_eq!(request.uri(), "/a?x=1");
    assert_eq!(request.parameter("x"), Some("1"));
    assert_eq!(request.header("host"), Some("h"));
    assert_eq!(request.version(), Version::HTTP_11);
}

#[test]
fn curl_request_with_bare_line_feeds() {
    let input = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

    "##};
    let (action, _, parser) = run(&ServerConfig::default(), input.as_bytes());

    assert_eq!(action, Action::Done(StatusCode::OK));
    let request = parser.request();
    assert_eq!(request.path(), "/index.html");
    assert_eq!(request.headers().len(), 3);
    assert_eq!(request.header("user-agent"), Some("curl/7.79.1"));
    assert_eq!(request.header("accept"), Some("*/*"));
}

#[test]
fn edge_request_keeps_repeated_parameters() {
    let input = indoc! {r##"
        GET /index/?a=1&b=2&a=3 HTTP/1.1
        Host: 127.0.0.1:8080
        Connection: keep-alive
        sec-ch-ua: "#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109"
        Accept-Language: zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7

    "##};
    let (action, _, parser) = run(&ServerConfig::default(), input.as_bytes());

    assert_eq!(action, Action::Done(StatusCode::OK));
    let request = parser.request();
    assert_eq!(request.path(), "/index/");
    assert_eq!(request.parameters().get_all("a"), ["1", "3"]);
    assert_eq!(request.parameter("b"), Some("2"));
    assert_eq!(
        request.header("sec-ch-ua"),
        Some(r##""#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109""##)
    );
}

#[test]
fn percent_decoding_of_path_and_query() {
    let input = b"GET /a%20b+c?q=x+y%21&e= HTTP/1.1\r\n\r\n";
    let (action, _, parser) = run(&ServerConfig::default(), input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(parser.request().path(), "/a b+c");
    assert_eq!(parser.request().parameter("q"), Some("x y!"));
    assert_eq!(parser.request().parameter("e"), Some(""));
}

#[test]
fn malformed_escape_is_bad_request() {
    let config = ServerConfig::default();
    assert_eq!(status_of(&config, b"GET /a%2 HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(status_of(&config, b"GET /a?x=%g1 HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn absolute_form_target() {
    let input = b"OPTIONS http://example.com:81/p?k=v HTTP/1.0\r\n\r\n";
    let (action, _, parser) = run(&ServerConfig::default(), input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    let request = parser.request();
    assert_eq!(request.method(), Method::OPTIONS);
    assert_eq!(request.scheme(), Some("http"));
    assert_eq!(request.host(), Some("example.com"));
    assert_eq!(request.port(), Some(81));
    assert_eq!(request.path(), "/p");
    assert_eq!(request.version(), Version::HTTP_10);
}

#[test]
fn method_is_uppercased_and_checked() {
    let config = ServerConfig::default();
    let (action, _, parser) = run(&config, b"delete /x HTTP/1.1\r\n\r\n");
    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(parser.request().method(), Method::DELETE);

    assert_eq!(status_of(&config, b"PATCH /x HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::METHOD_NOT_ALLOWED));
    assert_eq!(status_of(&config, b"GE(T /x HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn method_length_is_capped() {
    let config = ServerConfig::default();
    let long = format!("{} / HTTP/1.1\r\n\r\n", "A".repeat(17));
    let (action, consumed, _) = run(&config, long.as_bytes());

    assert_eq!(action, Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(consumed, 17);
}

#[test]
fn versions() {
    let config = ServerConfig::default();
    assert_eq!(status_of(&config, b"GET / HTTP/2.0\r\n\r\n"), Action::Done(StatusCode::HTTP_VERSION_NOT_SUPPORTED));
    assert_eq!(status_of(&config, b"GET / HTTP/3\r\n\r\n"), Action::Done(StatusCode::HTTP_VERSION_NOT_SUPPORTED));
    assert_eq!(status_of(&config, b"GET / HTTX/1.1\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(status_of(&config, b"GET / HTTP/1.x\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(status_of(&config, b"GET /\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn uri_length_is_capped() {
    let config = ServerConfig::default().limits(ParserLimits { max_uri_length: 8, ..ParserLimits::default() });
    assert_eq!(status_of(&config, b"GET /1234567 HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::OK));
    assert_eq!(status_of(&config, b"GET /12345678 HTTP/1.1\r\n\r\n"), Action::Done(StatusCode::URI_TOO_LONG));
}

#[test]
fn oversized_header_value_is_rejected_wherever_the_cap_is_crossed() {
    const CAP: usize = 8;
    let config = ServerConfig::default().limits(ParserLimits { max_header_value_length: CAP, ..ParserLimits::default() });

    for (length, expected) in [(CAP - 1, StatusCode::OK), (CAP, StatusCode::OK), (CAP + 1, StatusCode::PAYLOAD_TOO_LARGE)] {
        let input = format!("GET / HTTP/1.1\r\nX-Long: {}\r\n\r\n", "v".repeat(length));

        // split the input at every offset to cross the cap in any read
        for split in 0..input.len() {
            let mut parser = RequestParser::new(&config);
            let (mut action, first) = parser.parse(&input.as_bytes()[..split]);
            if !action.is_done() {
                action = parser.parse(&input.as_bytes()[first..]).0;
            }
            assert_eq!(action, Action::Done(expected), "length {length} split {split}");
        }
    }
}

#[test]
fn oversized_header_name_is_rejected() {
    let config = ServerConfig::default().limits(ParserLimits { max_header_name_length: 4, ..ParserLimits::default() });
    assert_eq!(status_of(&config, b"GET / HTTP/1.1\r\nAbcd: 1\r\n\r\n"), Action::Done(StatusCode::OK));
    assert_eq!(status_of(&config, b"GET / HTTP/1.1\r\nAbcde: 1\r\n\r\n"), Action::Done(StatusCode::PAYLOAD_TOO_LARGE));
}

#[test]
fn header_count_is_capped() {
    let config = ServerConfig::default().limits(ParserLimits { max_header_count: 2, ..ParserLimits::default() });
    assert_eq!(status_of(&config, b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n"), Action::Done(StatusCode::OK));
    assert_eq!(
        status_of(&config, b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nA: 3\r\n\r\n"),
        Action::Done(StatusCode::PAYLOAD_TOO_LARGE)
    );
}

#[test]
fn folded_and_empty_headers() {
    let input = b"GET / HTTP/1.1\r\nX-Folded: first\r\n \t second\r\nX-Empty:\r\nX-Bare\r\nX-Trailing: v  \r\n\r\n";
    let (action, _, parser) = run(&ServerConfig::default(), input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    let request = parser.request();
    assert_eq!(request.header("x-folded"), Some("first second"));
    assert_eq!(request.header("x-empty"), Some(""));
    assert_eq!(request.header("x-bare"), Some(""));
    assert_eq!(request.header("x-trailing"), Some("v"));
}

#[test]
fn fold_before_any_header_is_rejected() {
    let config = ServerConfig::default();
    assert_eq!(status_of(&config, b"GET / HTTP/1.1\r\n folded\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn trace_with_body_is_rejected_before_the_body() {
    let input = b"TRACE / HTTP/1.1\r\nContent-Length: 1\r\n\r\nX";
    let (action, consumed, _) = run(&ServerConfig::default(), input);

    assert_eq!(action, Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(consumed, input.len() - 1);

    let chunked = b"TRACE / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    assert_eq!(status_of(&ServerConfig::default(), chunked), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn content_length_validation() {
    let config = ServerConfig::default().maximal_content_length(1024);
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n"),
        Action::Done(StatusCode::BAD_REQUEST)
    );
    assert_eq!(status_of(&config, b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n"), Action::Done(StatusCode::BAD_REQUEST));
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nContent-Length: 2000\r\n\r\n"),
        Action::Done(StatusCode::PAYLOAD_TOO_LARGE)
    );
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n"),
        Action::Done(StatusCode::PAYLOAD_TOO_LARGE)
    );
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 3\r\n\r\nabc"),
        Action::Done(StatusCode::OK)
    );
}

#[test]
fn transfer_and_expect_validation() {
    let config = ServerConfig::default();
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n"),
        Action::Done(StatusCode::NOT_IMPLEMENTED)
    );
    assert_eq!(
        status_of(&config, b"POST / HTTP/1.1\r\nExpect: something\r\nContent-Length: 1\r\n\r\nx"),
        Action::Done(StatusCode::BAD_REQUEST)
    );

    let mut parser = RequestParser::new(&config);
    let (action, _) = parser.parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: identity, Chunked\r\n\r\n");
    assert_eq!(action, Action::CheckHeaders);
    assert!(parser.is_chunked());
    assert_eq!(parser.status(), StatusCode::CONTINUE);
}

#[test]
fn expect_continue_is_reported_in_the_status() {
    let mut parser = RequestParser::new(&ServerConfig::default());
    let (action, _) = parser.parse(b"PUT /f HTTP/1.1\r\nExpect: 100-Continue\r\nContent-Length: 2\r\n\r\n");
    assert_eq!(action, Action::CheckHeaders);
    assert!(parser.expect_continue());

    assert_eq!(parser.parse(b"ok").0, Action::Done(StatusCode::CONTINUE));
}

#[test]
fn maximal_content_length_caps_the_whole_request() {
    let input = b"GET / HTTP/1.1\r\nHost: h\r\n\r\n";
    let config = ServerConfig::default().maximal_content_length(input.len());
    assert_eq!(status_of(&config, input), Action::Done(StatusCode::OK));

    let config = ServerConfig::default().maximal_content_length(input.len() - 1);
    let (action, consumed, _) = run(&config, input);
    assert_eq!(action, Action::Done(StatusCode::PAYLOAD_TOO_LARGE));
    assert_eq!(consumed, input.len());
}

#[test]
fn done_parser_ignores_further_bytes() {
    let mut parser = RequestParser::new(&ServerConfig::default());
    let input = b"GET / HTTP/1.1\r\n\r\n";
    assert_eq!(parser.parse(input).0, Action::Done(StatusCode::OK));
    let index = parser.index();

    assert_eq!(parser.consume(b'x'), Action::Done(StatusCode::OK));
    assert_eq!(parser.index(), index);
}

#[test]
fn urlencoded_post_body() {
    let pool = pool(16);
    let input = b"POST /form HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 20\r\n\r\nname=J%C3%B6rg&x=a+b";
    let (action, request) = parse_request(&pool, input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(request.parameter("name"), Some("Jörg"));
    assert_eq!(request.parameter("x"), Some("a b"));
    assert_eq!(request.content_length(), 20);
}

#[test]
fn urlencoded_body_with_bad_escape() {
    let input = b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=%zz&b";
    assert_eq!(status_of(&ServerConfig::default(), input), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn remainder_body_is_exposed_as_stream() {
    let pool = pool(8);
    let input = b"PUT /blob HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\nhello world";
    let (action, request) = parse_request(&pool, input);

    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(request.content_type().map(Mime::essence_str), Some("text/plain"));
    assert_eq!(request.input_stream().copy_to_vec(), b"hello world");
    assert!(request.parameters().is_empty());
}

#[test]
fn multipart_form_with_two_fields_and_a_file() {
    let content = "Hello, multipart world!\r\nSecond line, a bit longer than one block.";
    let body = format!(
        "------X\r\n\
         Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
         ------X\r\n\
         Content-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n\
         ------X\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"hello.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         ------X--\r\n"
    );
    let input = format!(
        "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=----X\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let pool = pool(16);
    let (action, request) = parse_request(&pool, input.as_bytes());

    assert_eq!(action, Action::Done(StatusCode::OK));
    assert_eq!(request.parameter("a"), Some("1"));
    assert_eq!(request.parameter("b"), Some("2"));
    assert_eq!(request.parts().len(), 1);

    let part = &request.parts()[0];
    assert_eq!(part.name, "file");
    assert_eq!(part.file_name.as_deref(), Some("hello.txt"));
    assert_eq!(part.content_type.as_deref(), Some("text/plain"));
    assert_eq!(part.len(), content.len());
    assert!(request.chain().len() > 1);
    assert_eq!(request.part_bytes(part), content.as_bytes());
}

#[test]
fn multipart_without_boundary_is_rejected() {
    let input = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data\r\nContent-Length: 4\r\n\r\nabcd";
    assert_eq!(status_of(&ServerConfig::default(), input), Action::Done(StatusCode::BAD_REQUEST));
}

#[test]
fn multipart_cut_short_is_rejected() {
    let body = "--b\r\nContent-Disposition: form-data; name=k\r\n\r\nvalue";
    let input = format!(
        "POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=b\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    assert_eq!(status_of(&ServerConfig::default(), input.as_bytes()), Action::Done(StatusCode::BAD_REQUEST));
}

/// Applies byte substitutions and a cut to a valid request.
fn mutate(base: &[u8], edits: &[(usize, u8)], cut: usize) -> Vec<u8> {
    let mut input = base.to_vec();
    for &(at, byte) in edits {
        let at = at % input.len();
        input[at] = byte;
    }
    input.truncate(cut.min(input.len()));
    input
}

proptest! {
    #[test]
    fn parsing_is_deterministic(
        edits in proptest::collection::vec((any::<usize>(), any::<u8>()), 0..4),
        cut in 0usize..200,
        split in 0usize..200,
    ) {
        let base = b"POST /p?a=1&b=%41 HTTP/1.1\r\nHost: h\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\nc=3&d=4";
        let input = mutate(base, &edits, cut);
        let config = ServerConfig::default();

        let mut first = RequestParser::new(&config);
        let mut first_actions = Vec::new();
        for &byte in &input {
            first_actions.push(first.consume(byte));
        }

        let mut second = RequestParser::new(&config);
        let mut second_actions = Vec::new();
        let split = split.min(input.len());
        for &byte in input[..split].iter().chain(&input[split..]) {
            second_actions.push(second.consume(byte));
        }

        prop_assert_eq!(first_actions, second_actions);
        prop_assert_eq!(first.status(), second.status());
        prop_assert_eq!(first.index(), second.index());
        prop_assert_eq!(format!("{:?}", first.request()), format!("{:?}", second.request()));
    }
}
