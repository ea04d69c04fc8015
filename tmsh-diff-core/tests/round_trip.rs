use pretty_assertions::assert_eq;
use tmsh_diff_core::{parse, parse_file, write, write_file, Dialect};

const CONFIG: &str = r#"ltm pool /Common/web-pool {
    members {
        /Common/10.0.0.1:80 {
            address 10.0.0.1
        }
    }
    monitor /Common/http and /Common/tcp
}
ltm policy /Common/api_routing {
    controls { forwarding }
    rules {
        api {
            actions {
                0 {
                    forward
                    select
                    pool /Common/web-pool
                }
            }
            conditions {
                0 {
                    http-uri
                    path
                    starts-with
                    values { /api /v2 }
                }
            }
        }
    }
    strategy /Common/first-match
}
ltm profile http /Common/http-x { }
"#;

fn dialect() -> Dialect {
    let mut dialect = Dialect::default();
    dialect
        .joined_fields
        .insert("monitor".to_string(), " and ".to_string());
    dialect.unordered_fields.insert("options".to_string());
    dialect
}

#[test]
fn parse_write_parse_round_trip_preserves_fields() {
    let first = parse(CONFIG, &dialect()).expect("initial parse should succeed");
    let written = write(&first, &dialect());
    let second = parse(&written, &dialect()).expect("re-parse should succeed");

    let first_bodies: Vec<_> = first.iter().map(|s| (&s.header, &s.body)).collect();
    let second_bodies: Vec<_> = second.iter().map(|s| (&s.header, &s.body)).collect();
    assert_eq!(first_bodies, second_bodies);
}

#[test]
fn canonical_text_is_a_fixed_point() {
    let first = write(&parse(CONFIG, &dialect()).expect("parse"), &dialect());
    let second = write(&parse(&first, &dialect()).expect("re-parse"), &dialect());
    assert_eq!(first, second);
}

#[test]
fn unordered_fields_normalize_before_writing() {
    let text = "ltm profile client-ssl /Common/ssl {\n    options { no-tlsv1 dont-insert-empty-fragments }\n}\n";
    let stanzas = parse(text, &dialect()).expect("parse");
    let written = write(&stanzas, &dialect());
    assert!(written.contains("options {\n        dont-insert-empty-fragments\n        no-tlsv1\n    }"));
}

#[test]
fn parse_and_write_file_round_trip() {
    let out_dir = tempfile::tempdir().expect("tempdir should be created");
    let out_path = out_dir.path().join("roundtrip.conf");

    let stanzas = parse(CONFIG, &dialect()).expect("parse should succeed");
    write_file(&stanzas, &dialect(), &out_path).expect("write_file should succeed");

    let reparsed = parse_file(&out_path, &dialect()).expect("parse_file should succeed");
    assert_eq!(stanzas.len(), reparsed.len());
    for (left, right) in stanzas.iter().zip(&reparsed) {
        assert_eq!(left.body, right.body);
    }
}
