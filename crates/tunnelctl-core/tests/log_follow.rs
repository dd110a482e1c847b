#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use tunnelctl_core::logtail;

fn append(path: &Path, text: &str) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

fn recv_n(rx: &mpsc::Receiver<String>, n: usize) -> Vec<String> {
    (0..n)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("line not delivered"))
        .collect()
}

#[test]
fn follow_streams_only_new_lines_across_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frpc.log");
    std::fs::write(&path, "before follow\n").unwrap();

    let tail = logtail::read_tail(&path, logtail::DEFAULT_TAIL_LINES).unwrap();
    assert_eq!(tail, vec!["before follow"]);
    let offset = logtail::current_len(&path).unwrap();

    let (tx, rx) = mpsc::channel();
    let follow_path = path.clone();
    std::thread::spawn(move || {
        logtail::follow(&follow_path, offset, |line| {
            let _ = tx.send(line.to_string());
        });
    });

    append(&path, "tick one\n");
    assert_eq!(recv_n(&rx, 1), vec!["tick one"]);

    append(&path, "tick two a\ntick two b\n");
    assert_eq!(recv_n(&rx, 2), vec!["tick two a", "tick two b"]);

    // Two full intervals with no growth must not re-deliver anything.
    std::thread::sleep(logtail::FOLLOW_INTERVAL * 2);
    assert!(rx.try_recv().is_err());
}
