//! Remote components over the local shell transport with translated roots.
//!
//! Every call is made with local-side paths; files live only under the
//! fixture's remote root, so a passing test also shows the path mapping.

mod common;

use common::{RemoteFixture, file_available, rg_available, run_async};
use pi_ssh::error::Error;
use pi_ssh::remote::channel::{CommandChannel, Transport};
use pi_ssh::remote::command::ShellCommand;
use pi_ssh::remote::exec::{self, ExecOptions, ExecOutcome};
use pi_ssh::remote::find::{self, NO_FILES_FOUND};
use pi_ssh::remote::grep::{self, GrepRequest, NO_MATCHES_FOUND};
use pi_ssh::remote::{file_io, ls};
use pi_ssh::truncate::{DEFAULT_MAX_BYTES, LimitOutcome};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// The byte ceiling fired and nothing else did.
fn assert_byte_capped(outcome: &LimitOutcome) {
    assert!(outcome.truncated_bytes);
    assert!(outcome.content.len() <= DEFAULT_MAX_BYTES);
    assert!(std::str::from_utf8(outcome.content.as_bytes()).is_ok());
    let rendered = outcome.render();
    assert!(
        rendered.ends_with("\n\n[50KB limit reached]"),
        "notice: {:?}",
        rendered.rsplit("\n\n").next()
    );
    let details = outcome.details().expect("details");
    assert_eq!(details["truncation"]["truncated"], true);
}

fn grep_request(pattern: &str) -> GrepRequest {
    GrepRequest {
        pattern: pattern.to_string(),
        ..GrepRequest::default()
    }
}

mod listing {
    use super::*;

    #[test]
    fn lists_translated_directory() {
        let fixture = RemoteFixture::new("lists_translated_directory");
        fixture.create_remote_file("src/main.go", "package main\n");
        fixture.create_remote_file("src/.env", "X=1\n");
        fixture.create_remote_dir("src/lib");
        let ws = fixture.workspace();
        let dir = fixture.local("src");

        let outcome = run_async(async move { ls::ls(&ws, Some(&dir), None).await }).unwrap();
        assert_eq!(outcome.render(), ".env\nlib/\nmain.go");
        assert!(outcome.details().is_none());
    }

    #[test]
    fn over_cap_listing_keeps_cap_entries() {
        let fixture = RemoteFixture::new("over_cap_listing_keeps_cap_entries");
        for idx in 0..7 {
            fixture.create_remote_file(&format!("f{idx}.txt"), "");
        }
        let ws = fixture.workspace();

        let outcome = run_async(async move { ls::ls(&ws, None, Some(5)).await }).unwrap();
        assert_eq!(
            outcome.render(),
            "f0.txt\nf1.txt\nf2.txt\nf3.txt\nf4.txt\n\n[5 entries limit reached. Use limit=10 for more]"
        );
        assert_eq!(outcome.details(), Some(json!({ "entryLimitReached": 5 })));
    }

    #[test]
    fn empty_directory_placeholder() {
        let fixture = RemoteFixture::new("empty_directory_placeholder");
        fixture.create_remote_dir("empty");
        let ws = fixture.workspace();

        let outcome = run_async(async move { ls::ls(&ws, Some("empty"), None).await }).unwrap();
        assert_eq!(outcome.render(), "(empty directory)");
    }

    #[test]
    fn missing_path_and_file_path_are_distinct_errors() {
        let fixture = RemoteFixture::new("missing_path_and_file_path_are_distinct_errors");
        fixture.create_remote_file("notes.txt", "hi");
        let ws = fixture.workspace();
        let missing = fixture.remote("nope");
        let file = fixture.remote("notes.txt");

        let (missing_err, file_err) = run_async(async move {
            (
                ls::ls(&ws, Some("nope"), None).await.unwrap_err(),
                ls::ls(&ws, Some("notes.txt"), None).await.unwrap_err(),
            )
        });
        assert!(matches!(missing_err, Error::PathNotFound(ref p) if *p == missing));
        assert!(matches!(file_err, Error::NotADirectory(ref p) if *p == file));
    }

    #[test]
    fn long_listing_is_capped_at_50kb() {
        let fixture = RemoteFixture::new("long_listing_is_capped_at_50kb");
        let padding = "x".repeat(90);
        for idx in 0..600 {
            fixture.create_remote_file(&format!("entry-{idx:04}-{padding}.txt"), "");
        }
        let ws = fixture.workspace();

        let outcome = run_async(async move { ls::ls(&ws, None, Some(1000)).await }).unwrap();
        assert_byte_capped(&outcome);
        assert!(outcome.content.starts_with(&format!("entry-0000-{padding}.txt\n")));
        assert!(!outcome.render().contains("entries limit reached"));
    }
}

mod finding {
    use super::*;

    #[test]
    fn zero_matches_is_the_placeholder() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("zero_matches_is_the_placeholder");
        fixture.create_remote_file("src/main.go", "package main\n");
        let ws = fixture.workspace();

        let outcome = run_async(async move { find::find(&ws, "*.md", None, None).await }).unwrap();
        assert_eq!(outcome.render(), NO_FILES_FOUND);
        assert!(outcome.details().is_none());
    }

    #[test]
    fn results_are_relative_and_sorted() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("results_are_relative_and_sorted");
        fixture.create_remote_file("README.md", "# app\n");
        fixture.create_remote_file("docs/a.md", "a\n");
        fixture.create_remote_file(".github/notes.md", "hidden\n");
        fixture.create_remote_file("src/x.rs", "\n");
        let ws = fixture.workspace();
        let root = fixture.local_root.clone();

        let outcome =
            run_async(async move { find::find(&ws, "*.md", Some(&root), None).await }).unwrap();
        assert_eq!(outcome.render(), ".github/notes.md\ndocs/a.md\nREADME.md");
    }

    #[test]
    fn reaching_the_cap_is_reported() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("reaching_the_cap_is_reported");
        for name in ["a.md", "b.md", "c.md"] {
            fixture.create_remote_file(name, "");
        }
        let ws = fixture.workspace();

        let outcome = run_async(async move { find::find(&ws, "*.md", None, Some(2)).await }).unwrap();
        assert_eq!(
            outcome.render(),
            "a.md\nb.md\n\n[2 results limit reached. Use limit=4 for more, or refine pattern]"
        );
        assert_eq!(outcome.details(), Some(json!({ "resultLimitReached": 2 })));
    }

    #[test]
    fn long_result_list_is_capped_at_50kb() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("long_result_list_is_capped_at_50kb");
        let padding = "f".repeat(90);
        for idx in 0..600 {
            fixture.create_remote_file(&format!("docs/{idx:04}-{padding}.md"), "");
        }
        let ws = fixture.workspace();

        let outcome = run_async(async move { find::find(&ws, "*.md", None, None).await }).unwrap();
        assert_byte_capped(&outcome);
        assert!(outcome.content.starts_with(&format!("docs/0000-{padding}.md\n")));
        assert!(!outcome.render().contains("results limit reached"));
    }
}

mod searching {
    use super::*;

    #[test]
    fn zero_matches_is_the_placeholder() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("grep_zero_matches");
        fixture.create_remote_file("a.txt", "alpha\nbeta\n");
        let ws = fixture.workspace();

        let outcome =
            run_async(async move { grep::grep(&ws, &grep_request("gamma")).await }).unwrap();
        assert_eq!(outcome.render(), NO_MATCHES_FOUND);
        assert!(outcome.details().is_none());
    }

    #[test]
    fn context_window_marks_match_and_context_lines() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("context_window_marks_match_and_context_lines");
        let body = (1..=10)
            .map(|n| if n == 5 { "needle".to_string() } else { format!("line {n}") })
            .collect::<Vec<_>>()
            .join("\n");
        fixture.create_remote_file("src/a.txt", body);
        let ws = fixture.workspace();
        let request = GrepRequest {
            context: Some(2),
            ..grep_request("needle")
        };

        let outcome = run_async(async move { grep::grep(&ws, &request).await }).unwrap();
        assert_eq!(
            outcome.render(),
            "src/a.txt-3- line 3\nsrc/a.txt-4- line 4\nsrc/a.txt:5: needle\nsrc/a.txt-6- line 6\nsrc/a.txt-7- line 7"
        );
    }

    #[test]
    fn context_window_is_clamped_at_file_edges() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("context_window_is_clamped_at_file_edges");
        fixture.create_remote_file("edge.txt", "needle\nsecond\r\nthird");
        let ws = fixture.workspace();
        let file = fixture.local("edge.txt");
        let request = GrepRequest {
            path: Some(file),
            context: Some(5),
            ..grep_request("needle")
        };

        let outcome = run_async(async move { grep::grep(&ws, &request).await }).unwrap();
        assert_eq!(
            outcome.render(),
            "edge.txt:1: needle\nedge.txt-2- second\nedge.txt-3- third"
        );
    }

    #[test]
    fn match_cap_and_long_lines_are_flagged() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("match_cap_and_long_lines_are_flagged");
        let long_line = format!("hit {}", "x".repeat(600));
        fixture.create_remote_file("a.txt", format!("{long_line}\nhit two\nhit three\n"));
        let ws = fixture.workspace();
        let request = GrepRequest {
            limit: Some(2),
            ..grep_request("hit")
        };

        let outcome = run_async(async move { grep::grep(&ws, &request).await }).unwrap();
        let text = outcome.render();
        assert!(text.contains("a.txt:2: hit two"), "{text}");
        assert!(!text.contains("hit three"));
        assert!(text.ends_with(
            "[2 matches limit reached. Use limit=4 for more, or refine pattern. Some lines truncated to 500 chars. Use read tool to see full lines]"
        ));
        assert_eq!(
            outcome.details(),
            Some(json!({ "matchLimitReached": 2, "linesTruncated": true }))
        );
    }

    #[test]
    fn literal_and_ignore_case_flags_reach_rg() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("literal_and_ignore_case_flags_reach_rg");
        fixture.create_remote_file("a.txt", "Value (x)\nvalue y\n");
        let ws = fixture.workspace();
        let request = GrepRequest {
            literal: Some(true),
            ignore_case: Some(true),
            ..grep_request("VALUE (X)")
        };

        let outcome = run_async(async move { grep::grep(&ws, &request).await }).unwrap();
        assert_eq!(outcome.render(), "a.txt:1: Value (x)");
    }

    #[test]
    fn regex_errors_still_fail_with_their_exit_code() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        // rg exits 2 for an invalid pattern; only exit 1 means "no match".
        let fixture = RemoteFixture::new("regex_errors_still_fail_with_their_exit_code");
        fixture.create_remote_file("a.txt", "text\n");
        let ws = fixture.workspace();

        let err = run_async(async move { grep::grep(&ws, &grep_request("(unclosed")).await })
            .unwrap_err();
        assert!(matches!(err, Error::Transport { code: 2, .. }), "{err}");
    }

    #[test]
    fn long_match_output_is_capped_at_50kb_on_a_char_boundary() {
        if !rg_available() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let fixture = RemoteFixture::new("long_match_output_is_capped_at_50kb_on_a_char_boundary");
        let body = (0..300)
            .map(|n| format!("needle {n:03} {}", "\u{e9}".repeat(190)))
            .collect::<Vec<_>>()
            .join("\n");
        fixture.create_remote_file("big.txt", body);
        let ws = fixture.workspace();
        let request = GrepRequest {
            limit: Some(1000),
            ..grep_request("needle")
        };

        let outcome = run_async(async move { grep::grep(&ws, &request).await }).unwrap();
        assert_byte_capped(&outcome);
        assert!(outcome.content.starts_with("big.txt:1: needle 000 "));
        assert!(!outcome.content.ends_with('\u{fffd}'));
        let rendered = outcome.render();
        assert!(!rendered.contains("matches limit reached"));
        assert!(!rendered.contains("Some lines truncated"));
    }
}

mod exit_codes {
    use super::*;

    #[test]
    fn only_exit_one_is_remapped() {
        let channel = CommandChannel::new(Transport::LocalShell);
        let results = run_async(async move {
            let mut results = Vec::new();
            for code in 0..=3 {
                let cmd = ShellCommand::new("sh")
                    .arg("-c")
                    .arg(&format!("exit {code}"))
                    .remap_no_match();
                results.push(channel.run(cmd.as_str()).await.map(|r| r.exit_code));
            }
            results
        });

        assert_eq!(results[0].as_ref().ok(), Some(&0));
        assert_eq!(results[1].as_ref().ok(), Some(&0));
        for (code, result) in [(2, &results[2]), (3, &results[3])] {
            assert!(
                matches!(result, Err(Error::Transport { code: c, .. }) if *c == code),
                "exit {code} must fail"
            );
        }
    }
}

mod file_contents {
    use super::*;

    #[test]
    fn write_then_read_round_trips_text_and_bytes() {
        let fixture = RemoteFixture::new("write_then_read_round_trips_text_and_bytes");
        let ws = fixture.workspace();
        let ascii = b"plain ascii\nsecond line\n".to_vec();
        let utf8 = "héllo wörld ✓ 日本語\n__PI_SSH_EOF__\n'quotes' \"and\" $vars\n"
            .as_bytes()
            .to_vec();
        let binary: Vec<u8> = (0..=255).collect();
        let cases = vec![
            ("ascii.txt".to_string(), ascii),
            ("utf8.txt".to_string(), utf8),
            ("bin.dat".to_string(), binary),
        ];
        let expected = cases.clone();

        let read_back = run_async(async move {
            let mut out = Vec::new();
            for (name, content) in &cases {
                file_io::write_file(&ws, name, content).await.unwrap();
                out.push(file_io::read_file(&ws, name).await.unwrap());
            }
            out
        });

        for ((name, content), read) in expected.iter().zip(read_back) {
            assert_eq!(&read, content, "{name}");
            assert_eq!(&fixture.read_remote(name), content, "{name}");
            assert!(!fixture.local_exists(name));
        }
    }

    #[test]
    fn mkdir_creates_nested_directories() {
        let fixture = RemoteFixture::new("mkdir_creates_nested_directories");
        let ws = fixture.workspace();
        let dir = fixture.local("a/b/c");

        run_async(async move {
            file_io::mkdir(&ws, &dir).await.unwrap();
            file_io::mkdir(&ws, &dir).await.unwrap();
        });
        assert!(std::path::Path::new(&fixture.remote("a/b/c")).is_dir());
    }

    #[test]
    fn unreadable_path_is_not_found() {
        let fixture = RemoteFixture::new("unreadable_path_is_not_found");
        let ws = fixture.workspace();
        let expected = fixture.remote("missing.txt");

        let err = run_async(async move { file_io::read_file(&ws, "missing.txt").await }).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(ref p) if *p == expected));
    }

    #[test]
    fn mime_detection_reports_only_allow_listed_images() {
        if !file_available() {
            eprintln!("skipping: file(1) not installed");
            return;
        }
        let fixture = RemoteFixture::new("mime_detection_reports_only_allow_listed_images");
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0, 0, 0, 13]);
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
        png.extend_from_slice(&[0x1F, 0x15, 0xC4, 0x89]);
        fixture.create_remote_file("pixel.png", png);
        fixture.create_remote_file("notes.txt", "just text\n");
        let ws = fixture.workspace();

        let (image, text) = run_async(async move {
            (
                file_io::detect_mime_type(&ws, "pixel.png").await,
                file_io::detect_mime_type(&ws, "notes.txt").await,
            )
        });
        assert_eq!(image, Some("image/png"));
        assert_eq!(text, None);
    }
}

mod shell {
    use super::*;

    fn collecting_options() -> (ExecOptions, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let options = ExecOptions {
            on_data: Some(Arc::new(move |chunk: &[u8]| {
                sink.lock().unwrap().extend_from_slice(chunk);
            })),
            ..ExecOptions::default()
        };
        (options, output)
    }

    #[test]
    fn runs_in_the_translated_working_directory() {
        let fixture = RemoteFixture::new("runs_in_the_translated_working_directory");
        fixture.create_remote_dir("sub");
        let ws = fixture.workspace();
        let cwd = fixture.local("sub");
        let (options, output) = collecting_options();

        let outcome = run_async(async move { exec::exec(&ws, "pwd", &cwd, &options).await }).unwrap();
        assert_eq!(outcome, ExecOutcome { exit_code: Some(0) });
        let printed = String::from_utf8(output.lock().unwrap().clone()).unwrap();
        assert_eq!(
            std::fs::canonicalize(printed.trim()).unwrap(),
            std::fs::canonicalize(fixture.remote("sub")).unwrap()
        );
    }

    #[test]
    fn non_zero_exit_is_an_outcome_not_an_error() {
        let fixture = RemoteFixture::new("non_zero_exit_is_an_outcome_not_an_error");
        let ws = fixture.workspace();
        let cwd = fixture.local_root.clone();
        let (options, output) = collecting_options();

        let outcome = run_async(async move {
            exec::exec(&ws, "echo out; echo err >&2; exit 3", &cwd, &options).await
        })
        .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        let printed = String::from_utf8(output.lock().unwrap().clone()).unwrap();
        assert!(printed.contains("out"));
        assert!(printed.contains("err"));
    }
}
