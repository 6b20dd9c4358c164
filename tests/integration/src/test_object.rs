//! Object CRUD tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::checksums::{compute_etag, md5_digest};
    use fakes3_storage::range::ObjectRangeRequest;
    use fakes3_storage::service::CopySource;
    use fakes3_storage::types::{Metadata, ObjectId};
    use fakes3_storage::PutObjectOptions;

    use crate::{all_engines, put, read};

    #[test]
    fn test_should_round_trip_payloads() {
        let payloads: [&[u8]; 4] = [b"", b"x", b"hello world", &[0xAB; 4099]];
        for engine in all_engines() {
            let bucket = engine.bucket("rt");
            for (i, payload) in payloads.iter().enumerate() {
                let key = format!("obj-{i}");
                let result = put(&engine.s3, &bucket, &key, payload).unwrap();
                assert_eq!(result.etag, compute_etag(payload), "{}", engine.name);

                let obj = engine.s3.get_object(&bucket, &key, None, None).unwrap();
                assert_eq!(obj.size, payload.len() as u64, "{}", engine.name);
                assert_eq!(obj.hash, md5_digest(payload), "{}", engine.name);
                assert_eq!(obj.body.read_all().unwrap(), *payload, "{}", engine.name);
            }
        }
    }

    #[test]
    fn test_should_keep_user_metadata() {
        for engine in all_engines() {
            let bucket = engine.bucket("meta");
            let mut metadata = Metadata::new();
            metadata.insert("Content-Type".into(), "text/plain".into());
            metadata.insert("X-Amz-Meta-Owner".into(), "tests".into());
            let mut input: &[u8] = b"body";
            engine
                .s3
                .put_object(
                    &bucket,
                    "doc.txt",
                    &mut input,
                    4,
                    PutObjectOptions::builder().metadata(metadata.clone()).build(),
                )
                .unwrap();

            let head = engine.s3.head_object(&bucket, "doc.txt", None).unwrap();
            assert_eq!(head.metadata, metadata, "{}", engine.name);
            assert_eq!(head.size, 4, "{}", engine.name);
            assert!(head.body.read_all().unwrap().is_empty(), "{}", engine.name);
        }
    }

    #[test]
    fn test_should_overwrite_object() {
        for engine in all_engines() {
            let bucket = engine.bucket("ow");
            put(&engine.s3, &bucket, "k", b"first").unwrap();
            put(&engine.s3, &bucket, "k", b"second!").unwrap();
            assert_eq!(read(&engine.s3, &bucket, "k"), b"second!", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_serve_byte_ranges() {
        for engine in all_engines() {
            let bucket = engine.bucket("range");
            put(&engine.s3, &bucket, "r", b"contents").unwrap();

            let cases = [
                (ObjectRangeRequest::Forward { start: 1, end: Some(6) }, &b"ontent"[..]),
                (ObjectRangeRequest::Forward { start: 4, end: None }, &b"ents"[..]),
                (ObjectRangeRequest::Suffix(3), &b"nts"[..]),
                (ObjectRangeRequest::Suffix(100), &b"contents"[..]),
                (ObjectRangeRequest::Forward { start: 0, end: Some(100) }, &b"contents"[..]),
            ];
            for (range, expected) in cases {
                let obj = engine.s3.get_object(&bucket, "r", None, Some(&range)).unwrap();
                let resolved = obj.range.expect("resolved range");
                assert_eq!(resolved.length, expected.len() as u64, "{} {range:?}", engine.name);
                assert_eq!(obj.content_length(), expected.len() as u64);
                assert_eq!(obj.size, 8);
                assert_eq!(obj.body.read_all().unwrap(), expected, "{} {range:?}", engine.name);
            }

            let unsatisfiable = ObjectRangeRequest::Forward { start: 8, end: None };
            let err = engine
                .s3
                .get_object(&bucket, "r", None, Some(&unsatisfiable))
                .unwrap_err();
            assert_eq!(err.code(), "InvalidRange", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_delete_idempotently() {
        for engine in all_engines() {
            let bucket = engine.bucket("del");
            put(&engine.s3, &bucket, "k", b"v").unwrap();
            engine.s3.delete_object(&bucket, "k", None).unwrap();
            engine.s3.delete_object(&bucket, "k", None).unwrap();
            engine.s3.delete_object(&bucket, "never-existed", None).unwrap();
            let err = engine.s3.head_object(&bucket, "k", None).unwrap_err();
            assert_eq!(err.code(), "NoSuchKey", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_delete_many_objects() {
        for engine in all_engines() {
            let bucket = engine.bucket("multi");
            for key in ["a", "b", "nested/c"] {
                put(&engine.s3, &bucket, key, b"v").unwrap();
            }
            let ids = [ObjectId::key("a"), ObjectId::key("nested/c"), ObjectId::key("zzz")];
            let result = engine.s3.delete_multi(&bucket, &ids).unwrap();
            assert_eq!(result.deleted.len(), 3, "{}", engine.name);
            assert!(result.errors.is_empty(), "{}", engine.name);
            assert_eq!(read(&engine.s3, &bucket, "b"), b"v");
            assert!(engine.s3.head_object(&bucket, "a", None).is_err());
        }
    }

    #[test]
    fn test_should_copy_object() {
        for engine in all_engines() {
            let bucket = engine.bucket("copy");
            let mut metadata = Metadata::new();
            metadata.insert("color".into(), "green".into());
            let mut input: &[u8] = b"copy me";
            engine
                .s3
                .put_object(
                    &bucket,
                    "src",
                    &mut input,
                    7,
                    PutObjectOptions::builder().metadata(metadata).build(),
                )
                .unwrap();

            let source = CopySource {
                bucket: bucket.clone(),
                key: "src".into(),
                version_id: None,
            };
            let result = engine.s3.copy_object(&source, &bucket, "dst/copy", None).unwrap();
            assert_eq!(result.etag, compute_etag(b"copy me"), "{}", engine.name);
            let copy = engine.s3.get_object(&bucket, "dst/copy", None, None).unwrap();
            assert_eq!(copy.metadata["color"], "green", "{}", engine.name);
            assert_eq!(copy.body.read_all().unwrap(), b"copy me");
        }
    }

    #[test]
    fn test_should_reject_short_body() {
        for engine in all_engines() {
            let bucket = engine.bucket("short");
            let mut input: &[u8] = b"abc";
            let err = engine
                .s3
                .put_object(&bucket, "k", &mut input, 10, PutObjectOptions::default())
                .unwrap_err();
            assert_eq!(err.code(), "IncompleteBody", "{}", engine.name);
            assert!(engine.s3.head_object(&bucket, "k", None).is_err());

            // A declared size far beyond the body is not allocated up front.
            let mut input: &[u8] = b"abc";
            let err = engine
                .s3
                .put_object(&bucket, "k", &mut input, 1 << 40, PutObjectOptions::default())
                .unwrap_err();
            assert_eq!(err.code(), "IncompleteBody", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_store_folder_placeholders_outside_filesystem_engines() {
        for engine in all_engines() {
            let bucket = engine.bucket("folders");
            let result = put(&engine.s3, &bucket, "photos/", b"");
            if engine.name.starts_with("fs-") {
                // A key ending in "/" would name a directory on disk.
                assert_eq!(result.unwrap_err().code(), "InvalidArgument", "{}", engine.name);
            } else {
                result.unwrap();
                let head = engine.s3.head_object(&bucket, "photos/", None).unwrap();
                assert_eq!(head.size, 0, "{}", engine.name);
            }
        }
    }
}
