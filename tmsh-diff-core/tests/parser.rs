use tmsh_diff_core::{parse, split_stanzas, Dialect, FieldValue, ParseError, StanzaBody};

const POOL: &str = r#"
#TMSH-VERSION: 15.1.8

ltm pool /Common/web-pool {
    load-balancing-mode round-robin
    members {
        /Common/10.0.0.1:80 {
            address 10.0.0.1
        }
        /Common/10.0.0.2:80 {
            address 10.0.0.2
            session user-disabled
        }
    }
    monitor /Common/http and /Common/tcp
}
ltm virtual /Common/vs_web {
    destination /Common/192.0.2.10:443
    profiles {
        /Common/http { }
        /Common/tcp { }
    }
    rules {
        /Common/redirect
        /Common/log_requests
    }
    vlans {
        /Common/internal
        /Common/external
    }
    vlans-enabled
}
"#;

fn f5_dialect() -> Dialect {
    let mut dialect = Dialect::default();
    dialect.unordered_fields.insert("vlans".to_string());
    dialect
        .joined_fields
        .insert("monitor".to_string(), " and ".to_string());
    dialect
}

#[test]
fn parses_nested_blocks_lists_and_flags() {
    let stanzas = parse(POOL, &f5_dialect()).expect("parse should succeed");
    assert_eq!(stanzas.len(), 2);
    assert_eq!(stanzas[0].header_text(), "ltm pool /Common/web-pool");
    assert_eq!(stanzas[0].line, 4);

    let pool = stanzas[0].fields().expect("pool fields");
    assert_eq!(
        pool.get("monitor"),
        Some(&FieldValue::List(vec![
            "/Common/http".to_string(),
            "/Common/tcp".to_string()
        ]))
    );
    assert_eq!(
        pool.get_path(&["members", "/Common/10.0.0.2:80", "session"]),
        Some(&FieldValue::Scalar("user-disabled".to_string()))
    );

    let virtual_server = stanzas[1].fields().expect("virtual fields");
    assert_eq!(
        virtual_server.get("rules"),
        Some(&FieldValue::List(vec![
            "/Common/redirect".to_string(),
            "/Common/log_requests".to_string()
        ]))
    );
    assert_eq!(
        virtual_server.get("vlans"),
        Some(&FieldValue::Set(vec![
            "/Common/external".to_string(),
            "/Common/internal".to_string()
        ]))
    );
    assert_eq!(virtual_server.get("vlans-enabled"), Some(&FieldValue::Flag));
    let profiles = virtual_server
        .get("profiles")
        .and_then(FieldValue::as_block)
        .expect("profiles block");
    assert_eq!(profiles.names().collect::<Vec<_>>(), ["/Common/http", "/Common/tcp"]);
}

#[test]
fn quoted_braces_do_not_affect_nesting() {
    let text = r#"ltm monitor http /Common/check {
    recv "{\"status\": \"ok\"}"
    send "GET /health HTTP/1.0\r\n\r\n"
}
"#;
    let stanzas = parse(text, &Dialect::default()).expect("parse");
    let fields = stanzas[0].fields().expect("fields");
    assert_eq!(
        fields.get("recv"),
        Some(&FieldValue::Scalar(r#""{\"status\": \"ok\"}""#.to_string()))
    );
}

#[test]
fn missing_closing_brace_reports_section_and_line() {
    let text = "ltm pool /Common/broken {\n    members {\n        /Common/10.0.0.1:80 {\n    }\n";
    let err = split_stanzas(text).expect_err("should fail");
    match err {
        ParseError::Unbalanced { section, line, .. } => {
            assert_eq!(section, "ltm pool /Common/broken");
            assert_eq!(line, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stray_closing_brace_is_rejected() {
    let text = "ltm node /Common/n1 {\n    address 10.0.0.1\n}\n}\n";
    let err = split_stanzas(text).expect_err("should fail");
    assert!(matches!(err, ParseError::Unbalanced { line: 4, .. }));
}

#[test]
fn closing_brace_before_opening_brace_is_rejected() {
    let err = split_stanzas("ltm node /Common/n1 } {\n").expect_err("should fail");
    match err {
        ParseError::Unbalanced { section, line, .. } => {
            assert_eq!(section, "ltm node /Common/n1");
            assert_eq!(line, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = parse("ltm node /Common/n1 {\n    } address 10.0.0.1 {\n}\n", &Dialect::default())
        .expect_err("should fail");
    assert!(matches!(err, ParseError::Unbalanced { line: 2, .. }));
}

#[test]
fn inline_nested_blocks_stay_structured() {
    let text = "ltm pool /Common/p {\n    members { /Common/a:80 { } /Common/b:80 { } }\n}\n";
    let stanzas = parse(text, &Dialect::default()).expect("parse");
    let members = stanzas[0]
        .fields()
        .and_then(|fields| fields.get("members"))
        .and_then(FieldValue::as_block)
        .expect("members block");
    assert_eq!(members.names().collect::<Vec<_>>(), ["/Common/a:80", "/Common/b:80"]);
    assert!(members
        .get("/Common/a:80")
        .and_then(FieldValue::as_block)
        .is_some_and(|block| block.is_empty()));

    let multi_line = "ltm pool /Common/p {\n    members {\n        /Common/a:80 { }\n        /Common/b:80 { }\n    }\n}\n";
    let expanded = parse(multi_line, &Dialect::default()).expect("parse");
    assert_eq!(stanzas[0].fields(), expanded[0].fields());
}

#[test]
fn bare_top_level_line_is_not_a_declaration() {
    let err = split_stanzas("address 10.0.0.1\n").expect_err("should fail");
    assert!(matches!(err, ParseError::ExpectedDeclaration { line: 1, .. }));
}

#[test]
fn duplicate_fields_are_rejected() {
    let text = "ltm node /Common/n1 {\n    address 10.0.0.1\n    address 10.0.0.2\n}\n";
    let err = parse(text, &Dialect::default()).expect_err("should fail");
    match err {
        ParseError::DuplicateField { field, line, .. } => {
            assert_eq!(field, "address");
            assert_eq!(line, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn opaque_bodies_keep_script_text() {
    let text = "ltm rule /Common/r1 {\nwhen HTTP_REQUEST {\n    if { [HTTP::uri] starts_with \"/api\" } {\n        pool /Common/api\n    }\n}\n}\n";
    let raw = split_stanzas(text).expect("split");
    let stanza = raw.into_iter().next().expect("one stanza").into_opaque();
    match stanza.body {
        StanzaBody::Opaque(body) => {
            assert!(body.starts_with("when HTTP_REQUEST {"));
            assert!(body.contains("pool /Common/api"));
            assert_eq!(body.lines().count(), 5);
        }
        StanzaBody::Fields(_) => panic!("expected opaque body"),
    }
}
