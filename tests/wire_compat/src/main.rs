fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    use resumable_protocol::{Dialect, HeaderPair};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    /// Header list as `[[name, value], ...]`, order preserved.
    fn as_json(headers: Vec<HeaderPair>) -> serde_json::Value {
        serde_json::Value::Array(
            headers
                .into_iter()
                .map(|(name, value)| serde_json::json!([name, value]))
                .collect(),
        )
    }

    fn expected(dialect: Dialect, case: &str) -> serde_json::Value {
        let fixture = load_fixture("dialect_headers.json");
        let value = &fixture[dialect.as_str()][case];
        assert!(!value.is_null(), "missing fixture case {dialect}/{case}");
        value.clone()
    }

    const METADATA: &str = "filename ZGF0YS5iaW4=";

    // --- Dialect header sets ---

    #[test]
    fn version_headers() {
        for d in Dialect::ALL {
            assert_eq!(as_json(vec![d.version_header()]), expected(d, "version"), "{d}");
        }
    }

    #[test]
    fn creation_headers() {
        for d in Dialect::ALL {
            assert_eq!(
                as_json(d.creation_headers(Some(10), Some(METADATA))),
                expected(d, "creation"),
                "{d}"
            );
            assert_eq!(
                as_json(d.creation_headers(None, Some(METADATA))),
                expected(d, "creation_deferred"),
                "{d}"
            );
            assert_eq!(
                as_json(d.empty_creation_headers()),
                expected(d, "empty_creation"),
                "{d}"
            );
        }
    }

    #[test]
    fn chunk_headers() {
        for d in Dialect::ALL {
            assert_eq!(as_json(d.chunk_headers(4, false, None)), expected(d, "chunk"), "{d}");
            assert_eq!(
                as_json(d.chunk_headers(8, true, Some(10))),
                expected(d, "final_chunk_declaring_length"),
                "{d}"
            );
        }
    }

    #[test]
    fn every_dialect_has_fixtures() {
        let fixture = load_fixture("dialect_headers.json");
        let names: Vec<&str> = fixture
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        for d in Dialect::ALL {
            assert!(names.contains(&d.as_str()), "no fixture for {d}");
        }
        assert_eq!(names.len(), Dialect::ALL.len());
    }

    #[test]
    fn concatenation_headers() {
        assert_eq!(
            as_json(vec![resumable_protocol::partial_concat_header()]),
            serde_json::json!([["Upload-Concat", "partial"]])
        );
        assert_eq!(
            as_json(vec![resumable_protocol::final_concat_header(&[
                "https://up.example.com/files/p1",
                "https://up.example.com/files/p2",
            ])]),
            serde_json::json!([[
                "Upload-Concat",
                "final;https://up.example.com/files/p1 https://up.example.com/files/p2"
            ]])
        );
    }

    // --- Metadata codec ---

    #[test]
    fn metadata_encoding() {
        let fixture = load_fixture("metadata.json");
        let metadata: BTreeMap<String, String> =
            serde_json::from_value(fixture["metadata"].clone()).unwrap();
        let encoded = fixture["encoded"].as_str().unwrap();

        assert_eq!(
            resumable_protocol::encode_metadata(&metadata).as_deref(),
            Some(encoded)
        );
        assert_eq!(resumable_protocol::decode_metadata(encoded).unwrap(), metadata);
    }

    // --- Resumption records ---

    #[test]
    fn fixture_record_single() {
        let record = roundtrip_test::<resumable_store::ResumptionRecord>("record_single.json");
        assert_eq!(
            record.upload_url.as_deref(),
            Some("https://up.example.com/files/abc")
        );
        assert!(record.parallel_upload_urls.is_none());
        assert_eq!(record.size, Some(10));
    }

    #[test]
    fn fixture_record_split() {
        let record = roundtrip_test::<resumable_store::ResumptionRecord>("record_split.json");
        assert!(record.upload_url.is_none());
        assert_eq!(record.parallel_upload_urls.map(|u| u.len()), Some(2));
        assert_eq!(record.size, None, "deferred size serializes as null");
    }

    #[test]
    fn legacy_record_without_metadata() {
        let json = r#"{
            "size": 3,
            "creationTime": "2023-01-01T00:00:00Z",
            "uploadUrl": "https://up.example.com/files/old"
        }"#;
        let record: resumable_store::ResumptionRecord = serde_json::from_str(json).unwrap();
        assert!(
            record.metadata.is_empty(),
            "missing metadata should default to empty"
        );
    }
}
