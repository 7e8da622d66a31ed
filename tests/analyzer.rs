use repogen::analyzer::{
    describe_type_name, extract_parameters, strip_strings_and_comments,
    substitute_null_parameters, wrap_for_column_analysis,
};

#[test]
fn no_parameters_yields_empty_set() {
    assert!(extract_parameters("SELECT id FROM users").unwrap().is_empty());
}

#[test]
fn parameters_are_dense_and_ordered() {
    let params = extract_parameters("SELECT id FROM users WHERE id = $1").unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].index, 1);
    assert_eq!(params[0].db_type, "text");
    assert_eq!(params[0].rust_type, "String");

    let params =
        extract_parameters("SELECT id FROM users WHERE name = $1 AND age > $2 OR city = $3")
            .unwrap();
    assert_eq!(params.iter().map(|p| p.index).collect::<Vec<_>>(), [1, 2, 3]);
}

#[test]
fn repeated_placeholders_count_once() {
    let params =
        extract_parameters("SELECT id FROM t WHERE ($1::uuid IS NULL OR id > $1) LIMIT $2")
            .unwrap();
    assert_eq!(params.len(), 2);
}

#[test]
fn gaps_in_the_sequence_are_fatal() {
    let err = extract_parameters("SELECT id FROM users WHERE a = $1 AND b = $3").unwrap_err();
    assert!(err.contains("$2"), "{err}");

    let err = extract_parameters("SELECT id FROM users WHERE a = $2").unwrap_err();
    assert!(err.contains("$1"), "{err}");

    assert!(extract_parameters("SELECT id FROM users WHERE a = $0").is_err());
}

#[test]
fn placeholders_in_literals_and_comments_are_ignored() {
    let params =
        extract_parameters("SELECT '$5' AS literal, id FROM users WHERE id = $1").unwrap();
    assert_eq!(params.len(), 1);

    let params =
        extract_parameters("SELECT id -- uses $7\nFROM users WHERE id = $1").unwrap();
    assert_eq!(params.len(), 1);

    // A doubled quote stays inside the literal.
    let params =
        extract_parameters("SELECT 'it''s $9' AS quoted FROM users WHERE id = $1").unwrap();
    assert_eq!(params.len(), 1);
}

#[test]
fn stripping_preserves_shape_outside_literals() {
    let stripped = strip_strings_and_comments("SELECT 'abc' AS x -- tail\nFROM t WHERE id = $1");
    assert!(!stripped.contains("abc"));
    assert!(!stripped.contains("tail"));
    assert!(stripped.contains("$1"));
    assert!(stripped.contains('\n'));
}

#[test]
fn null_substitution_runs_highest_index_first() {
    assert_eq!(
        substitute_null_parameters("SELECT id FROM users", 0),
        "SELECT id FROM users"
    );
    assert_eq!(
        substitute_null_parameters("SELECT id FROM users WHERE id = $1", 1),
        "SELECT id FROM users WHERE id = NULL"
    );
    assert_eq!(
        substitute_null_parameters("WHERE name = $1 AND age > $2", 2),
        "WHERE name = NULL AND age > NULL"
    );
    // $1 must not eat the prefix of $10.
    let sql = (1..=10)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    assert_eq!(
        substitute_null_parameters(&sql, 10),
        std::iter::repeat("NULL").take(10).collect::<Vec<_>>().join(", ")
    );
}

#[test]
fn column_analysis_wraps_with_limit_zero() {
    assert_eq!(
        wrap_for_column_analysis("SELECT id FROM users WHERE id = $1;", 1),
        "SELECT * FROM (SELECT id FROM users WHERE id = NULL) AS sub LIMIT 0"
    );
    assert_eq!(
        wrap_for_column_analysis("SELECT id FROM users", 0),
        "SELECT * FROM (SELECT id FROM users) AS sub LIMIT 0"
    );
}

#[test]
fn describe_names_map_to_canonical_db_types() {
    let cases = [
        ("BOOL", "bool"),
        ("INT2", "int2"),
        ("INT4", "int4"),
        ("INT8", "int8"),
        ("FLOAT4", "float4"),
        ("FLOAT8", "float8"),
        ("TEXT", "text"),
        ("VARCHAR", "varchar"),
        ("DATE", "date"),
        ("TIME", "time"),
        ("TIMESTAMP", "timestamp"),
        ("TIMESTAMPTZ", "timestamptz"),
        ("NUMERIC", "numeric"),
        ("UUID", "uuid"),
        ("JSON", "json"),
        ("JSONB", "jsonb"),
        ("BYTEA", "bytea"),
    ];
    for (name, want) in cases {
        let (db_type, is_array) = describe_type_name(name);
        assert_eq!(db_type, want, "{name}");
        assert!(!is_array, "{name}");
    }

    // Unknown driver types fall through to text.
    assert_eq!(describe_type_name("TSVECTOR").0, "text");
    assert_eq!(describe_type_name("pg_lsn").0, "text");

    // Array types carry the element with the array flag.
    assert_eq!(describe_type_name("TEXT[]"), ("text".to_string(), true));
    assert_eq!(describe_type_name("INT4[]"), ("int4".to_string(), true));
}
