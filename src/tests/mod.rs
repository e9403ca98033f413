use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockito::Matcher;

use crate::probe::{self, ClientOptions, HttpProbe, Probe, ProbeOutcome};
use crate::runner::{CandidateSource, Options, Runner, ScanReport, ScanSession};

/// Reflects for urls containing `hit`, fails for `down`, and records every call.
#[derive(Default)]
struct ScriptedProbe {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        tokio::time::sleep(Duration::from_millis(1)).await;
        if url.contains("down") {
            ProbeOutcome::Failed {
                url: url.to_string(),
                cause: "connection refused".to_string(),
            }
        } else if url.contains("hit") {
            ProbeOutcome::Vulnerable(url.to_string())
        } else {
            ProbeOutcome::Clean(url.to_string())
        }
    }
}

fn candidates(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 5 {
            0 => format!("http://t/{i}?hit=xss<>"),
            1 => format!("http://down/{i}?q=xss<>"),
            _ => format!("http://t/{i}?q=xss<>"),
        })
        .collect()
}

async fn scan(urls: &[String], workers: usize) -> (ScanReport, Vec<u8>, Vec<String>) {
    let probe = Arc::new(ScriptedProbe::default());
    let mut session = ScanSession::new(probe.clone(), Vec::new()).workers(workers);
    session.extend(urls.iter().cloned());
    let (report, sink) = session.run().await.unwrap();
    let calls = probe.calls.lock().unwrap().clone();
    (report, sink, calls)
}

fn sink_lines(sink: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(sink)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_candidate_is_probed_exactly_once() {
    let urls = candidates(200);
    let (report, _, calls) = scan(&urls, 8).await;

    assert_eq!(report.total, 200);
    assert_eq!(report.processed, 200);
    assert_eq!(report.clean + report.failed + 40, 200);
    assert_eq!(calls.len(), 200);
    let unique: HashSet<_> = calls.iter().collect();
    assert_eq!(unique.len(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_count_does_not_change_the_findings() {
    let urls = candidates(60);
    let (single, single_sink, _) = scan(&urls, 1).await;
    let (many, many_sink, _) = scan(&urls, 8).await;

    let a: HashSet<_> = single.vulnerable.iter().cloned().collect();
    let b: HashSet<_> = many.vulnerable.iter().cloned().collect();
    assert_eq!(a, b);
    assert_eq!(a.len(), 12);

    let a: HashSet<_> = sink_lines(&single_sink).into_iter().collect();
    let b: HashSet<_> = sink_lines(&many_sink).into_iter().collect();
    assert_eq!(a, b);
    assert_eq!(single.processed, many.processed);
    assert_eq!(single.failed, many.failed);
}

#[tokio::test]
async fn repeated_scans_give_the_same_result_set() {
    let urls = candidates(25);
    let (first, _, _) = scan(&urls, 3).await;
    let (second, _, _) = scan(&urls, 3).await;
    let a: HashSet<_> = first.vulnerable.into_iter().collect();
    let b: HashSet<_> = second.vulnerable.into_iter().collect();
    assert_eq!(a, b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_reflected_url_counts_twice_but_is_written_once() {
    let urls = vec![
        "http://t/a?hit=xss<>".to_string(),
        "http://t/b?q=xss<>".to_string(),
        "http://t/a?hit=xss<>".to_string(),
    ];
    let (report, sink, calls) = scan(&urls, 2).await;

    assert_eq!(calls.len(), 3);
    assert_eq!(report.processed, 3);
    assert_eq!(report.clean, 1);
    assert_eq!(report.vulnerable, vec!["http://t/a?hit=xss<>".to_string()]);
    assert_eq!(sink_lines(&sink), vec!["http://t/a?hit=xss<>".to_string()]);
}

#[tokio::test]
async fn empty_input_finishes_immediately() {
    let (report, sink, calls) = scan(&[], 8).await;
    assert_eq!(report.total, 0);
    assert_eq!(report.processed, 0);
    assert!(report.vulnerable.is_empty());
    assert!(sink.is_empty());
    assert!(calls.is_empty());
}

#[tokio::test]
async fn failures_are_counted_and_never_reported_as_vulnerable() {
    let urls = vec![
        "http://down/1?q=xss<>".to_string(),
        "http://down/2?hit=xss<>".to_string(),
    ];
    let (report, sink, _) = scan(&urls, 2).await;
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 2);
    assert!(report.vulnerable.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn reflected_and_plain_pages_over_http() {
    let mut server = mockito::Server::new_async().await;
    let reflected = server
        .mock("GET", "/a")
        .match_query(Matcher::Any)
        .with_body("<html>hello xss<> there</html>")
        .create_async()
        .await;
    let plain = server
        .mock("GET", "/b")
        .match_query(Matcher::Any)
        .with_body("<html>nothing here</html>")
        .create_async()
        .await;

    let client = probe::build_client(&ClientOptions::default()).unwrap();
    let http_probe = Arc::new(HttpProbe::new(client, probe::DEFAULT_MARKER));
    let a = format!("{}/a?q=xss<>", server.url());
    let b = format!("{}/b?q=1", server.url());

    let mut session = ScanSession::new(http_probe, Vec::new()).workers(2);
    session.extend([a.clone(), b]);
    let (report, sink) = session.run().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.clean, 1);
    assert_eq!(report.vulnerable, vec![a.clone()]);
    assert_eq!(sink_lines(&sink), vec![a]);
    reflected.assert_async().await;
    plain.assert_async().await;
}

#[tokio::test]
async fn unreachable_host_is_a_failed_probe() {
    let client = probe::build_client(&ClientOptions {
        timeout_seconds: 2,
        ..ClientOptions::default()
    })
    .unwrap();
    let http_probe = Arc::new(HttpProbe::new(client, probe::DEFAULT_MARKER));
    let mut session = ScanSession::new(http_probe, Vec::new()).workers(1);
    session.enqueue("http://127.0.0.1:1/?q=xss<>");
    let (report, sink) = session.run().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(report.vulnerable.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn runner_reads_wordlist_and_writes_output_file() {
    let mut server = mockito::Server::new_async().await;
    let _reflect = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_body("results for xss<>")
        .create_async()
        .await;
    let _plain = server
        .mock("GET", "/about")
        .match_query(Matcher::Any)
        .with_body("about us")
        .create_async()
        .await;

    let hit = format!("{}/search?q=xss<>", server.url());
    let miss = format!("{}/about?q=xss<>", server.url());

    let dir = tempfile::tempdir().unwrap();
    let wordlist = dir.path().join("urls.txt");
    let mut file = std::fs::File::create(&wordlist).unwrap();
    writeln!(file, "{hit}").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "{miss}").unwrap();
    writeln!(file, "{hit}").unwrap();
    drop(file);

    let output = dir.path().join("vulnerable.txt");
    std::fs::write(&output, "stale line\n").unwrap();

    let runner = Runner::new(Options {
        candidates: CandidateSource::FilePath(wordlist.to_string_lossy().to_string()),
        output: Some(output.to_string_lossy().to_string()),
        workers: 3,
        show_progress: false,
        ..Options::default()
    })
    .unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.processed, 3);
    assert_eq!(report.clean, 1);
    assert_eq!(report.vulnerable, vec![hit.clone()]);

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written, format!("{hit}\n"));
}

#[tokio::test]
async fn runner_surfaces_missing_wordlist_before_probing() {
    let runner = Runner::new(Options {
        candidates: CandidateSource::FilePath("/definitely/not/here.txt".to_string()),
        show_progress: false,
        ..Options::default()
    })
    .unwrap();
    let err = runner.run().await.unwrap_err();
    assert!(err.to_string().contains("wordlist"));
}
