//! Conditional write tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::PutObjectOptions;
    use fakes3_storage::conditional::PutConditions;
    use fakes3_storage::types::PutObjectResult;
    use fakes3_storage::{FakeS3, StorageResult};

    use crate::{all_engines, put, read};

    fn put_if(
        s3: &FakeS3,
        bucket: &str,
        key: &str,
        body: &[u8],
        conditions: PutConditions,
    ) -> StorageResult<PutObjectResult> {
        let mut input = body;
        s3.put_object(
            bucket,
            key,
            &mut input,
            body.len() as u64,
            PutObjectOptions::builder().conditions(conditions).build(),
        )
    }

    #[test]
    fn test_should_create_only_when_absent() {
        for engine in all_engines() {
            let bucket = engine.bucket("ifnone");
            put_if(&engine.s3, &bucket, "k", b"first", PutConditions::if_none_match("*")).unwrap();

            let err = put_if(&engine.s3, &bucket, "k", b"second", PutConditions::if_none_match("*"))
                .unwrap_err();
            assert_eq!(err.code(), "PreconditionFailed", "{}", engine.name);
            assert_eq!(read(&engine.s3, &bucket, "k"), b"first", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_replace_only_matching_etag() {
        for engine in all_engines() {
            let bucket = engine.bucket("ifmatch");
            let v1 = put(&engine.s3, &bucket, "k", b"v1").unwrap();

            let err = put_if(&engine.s3, &bucket, "k", b"v2", PutConditions::if_match("\"stale\""))
                .unwrap_err();
            assert_eq!(err.code(), "PreconditionFailed", "{}", engine.name);

            put_if(&engine.s3, &bucket, "k", b"v2", PutConditions::if_match(v1.etag)).unwrap();
            assert_eq!(read(&engine.s3, &bucket, "k"), b"v2", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_fail_if_match_on_missing_key() {
        for engine in all_engines() {
            let bucket = engine.bucket("ifmissing");
            let err = put_if(&engine.s3, &bucket, "absent", b"x", PutConditions::if_match("*"))
                .unwrap_err();
            assert_eq!(err.code(), "PreconditionFailed", "{}", engine.name);
            assert!(engine.s3.head_object(&bucket, "absent", None).is_err());
        }
    }

    #[test]
    fn test_should_reject_if_none_match_on_current_etag() {
        for engine in all_engines() {
            let bucket = engine.bucket("ifnoneetag");
            let v1 = put(&engine.s3, &bucket, "k", b"same").unwrap();
            let err = put_if(&engine.s3, &bucket, "k", b"next", PutConditions::if_none_match(v1.etag))
                .unwrap_err();
            assert_eq!(err.code(), "PreconditionFailed", "{}", engine.name);

            put_if(&engine.s3, &bucket, "k", b"next", PutConditions::if_none_match("\"other\""))
                .unwrap();
            assert_eq!(read(&engine.s3, &bucket, "k"), b"next");
        }
    }
}
