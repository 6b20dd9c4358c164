//! Versioning tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::listing::ListBucketVersionsPage;
    use fakes3_storage::prefix::Prefix;
    use fakes3_storage::types::{VersionId, VersioningConfiguration, VersioningStatus};

    use crate::{Engine, put, read, versioned_engines};

    fn versioned_bucket(engine: &Engine, prefix: &str) -> String {
        let bucket = engine.bucket(prefix);
        engine
            .s3
            .set_versioning_configuration(&bucket, VersioningConfiguration::enabled())
            .unwrap();
        bucket
    }

    fn version_of(engine: &Engine, bucket: &str, key: &str, body: &[u8]) -> VersionId {
        put(&engine.s3, bucket, key, body)
            .unwrap()
            .version_id
            .expect("versioned put returns a version id")
    }

    #[test]
    fn test_should_enable_and_suspend_versioning() {
        for engine in versioned_engines() {
            let bucket = engine.bucket("cfg");
            let config = engine.s3.versioning_configuration(&bucket).unwrap();
            assert_eq!(config.status, VersioningStatus::Unset, "{}", engine.name);

            engine
                .s3
                .set_versioning_configuration(&bucket, VersioningConfiguration::enabled())
                .unwrap();
            assert!(engine.s3.versioning_configuration(&bucket).unwrap().is_enabled());

            engine
                .s3
                .set_versioning_configuration(&bucket, VersioningConfiguration::suspended())
                .unwrap();
            let config = engine.s3.versioning_configuration(&bucket).unwrap();
            assert_eq!(config.status, VersioningStatus::Suspended, "{}", engine.name);

            let err = engine
                .s3
                .set_versioning_configuration(&bucket, VersioningConfiguration::default())
                .unwrap_err();
            assert_eq!(err.code(), "InvalidArgument", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_keep_every_version() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "keep");
            let v1 = version_of(&engine, &bucket, "doc", b"one");
            let v2 = version_of(&engine, &bucket, "doc", b"two");
            let v3 = version_of(&engine, &bucket, "doc", b"three");
            assert!(v1 < v2 && v2 < v3, "{}", engine.name);

            assert_eq!(read(&engine.s3, &bucket, "doc"), b"three");
            let first = engine.s3.get_object(&bucket, "doc", Some(&v1), None).unwrap();
            assert_eq!(first.version_id.as_ref(), Some(&v1));
            assert_eq!(first.body.read_all().unwrap(), b"one");

            let head = engine.s3.head_object(&bucket, "doc", Some(&v2)).unwrap();
            assert_eq!(head.size, 3, "{}", engine.name);
        }
    }

    #[test]
    fn test_should_shadow_with_delete_marker() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "marker");
            let v1 = version_of(&engine, &bucket, "k", b"payload");

            let deleted = engine.s3.delete_object(&bucket, "k", None).unwrap();
            assert!(deleted.is_delete_marker, "{}", engine.name);
            let marker = deleted.version_id.expect("marker version id");

            let err = engine.s3.get_object(&bucket, "k", None, None).unwrap_err();
            assert_eq!(err.code(), "NoSuchKey", "{}", engine.name);
            let shadowed = engine.s3.get_object(&bucket, "k", Some(&v1), None).unwrap();
            assert_eq!(shadowed.body.read_all().unwrap(), b"payload");

            let marker_obj = engine.s3.head_object(&bucket, "k", Some(&marker)).unwrap();
            assert!(marker_obj.is_delete_marker, "{}", engine.name);

            // Removing the marker brings the object back.
            engine.s3.delete_object(&bucket, "k", Some(&marker)).unwrap();
            assert_eq!(read(&engine.s3, &bucket, "k"), b"payload", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_list_versions_newest_first() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "listv");
            let a1 = version_of(&engine, &bucket, "a", b"1");
            let a2 = version_of(&engine, &bucket, "a", b"22");
            version_of(&engine, &bucket, "b", b"333");
            engine.s3.delete_object(&bucket, "b", None).unwrap();

            let result = engine
                .s3
                .list_bucket_versions(&bucket, &Prefix::none(), &ListBucketVersionsPage::default())
                .unwrap();
            let summary: Vec<_> = result
                .versions
                .iter()
                .map(|v| (v.key.as_str(), v.is_latest, v.is_delete_marker))
                .collect();
            assert_eq!(
                summary,
                vec![
                    ("a", true, false),
                    ("a", false, false),
                    ("b", true, true),
                    ("b", false, false),
                ],
                "{}",
                engine.name
            );
            assert_eq!(result.versions[0].version_id, a2);
            assert_eq!(result.versions[1].version_id, a1);
            assert!(result.versions[2].etag.is_none());

            // The plain listing hides the deleted key.
            let plain = engine
                .s3
                .list_bucket(&bucket, &Prefix::none(), &Default::default())
                .unwrap();
            assert_eq!(plain.contents.len(), 1, "{}", engine.name);
        }
    }

    #[test]
    fn test_should_page_through_versions() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "pagev");
            for body in [&b"1"[..], b"2", b"3"] {
                version_of(&engine, &bucket, "k", body);
            }
            version_of(&engine, &bucket, "z", b"z");

            let mut page = ListBucketVersionsPage {
                max_keys: Some(2),
                ..Default::default()
            };
            let mut seen = Vec::new();
            loop {
                let result = engine
                    .s3
                    .list_bucket_versions(&bucket, &Prefix::none(), &page)
                    .unwrap();
                seen.extend(result.versions.iter().map(|v| (v.key.clone(), v.version_id.clone())));
                if !result.is_truncated {
                    break;
                }
                page.key_marker = result.next_key_marker;
                page.version_id_marker = result.next_version_id_marker;
            }
            assert_eq!(seen.len(), 4, "{}", engine.name);
            assert_eq!(seen[3].0, "z");

            let err = engine
                .s3
                .list_bucket_versions(
                    &bucket,
                    &Prefix::none(),
                    &ListBucketVersionsPage {
                        version_id_marker: Some(VersionId::null()),
                        ..Default::default()
                    },
                )
                .unwrap_err();
            assert_eq!(err.code(), "InvalidArgument", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_write_null_version_when_suspended() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "susp");
            let kept = version_of(&engine, &bucket, "k", b"versioned");
            engine
                .s3
                .set_versioning_configuration(&bucket, VersioningConfiguration::suspended())
                .unwrap();

            let first = put(&engine.s3, &bucket, "k", b"null one").unwrap();
            assert_eq!(first.version_id, Some(VersionId::null()), "{}", engine.name);
            put(&engine.s3, &bucket, "k", b"null two").unwrap();

            let versions = engine
                .s3
                .list_bucket_versions(&bucket, &Prefix::none(), &ListBucketVersionsPage::default())
                .unwrap()
                .versions;
            let ids: Vec<_> = versions.iter().map(|v| v.version_id.clone()).collect();
            assert_eq!(ids, vec![VersionId::null(), kept], "{}", engine.name);
            assert_eq!(read(&engine.s3, &bucket, "k"), b"null two");
        }
    }

    #[test]
    fn test_should_ignore_missing_versions_on_delete() {
        for engine in versioned_engines() {
            let bucket = versioned_bucket(&engine, "idem");
            let missing = VersionId::new("does-not-exist");
            engine.s3.delete_object(&bucket, "k", Some(&missing)).unwrap();
            engine.s3.delete_object(&bucket, "k", Some(&missing)).unwrap();
        }
    }
}
