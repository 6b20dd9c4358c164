//! Multipart upload tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::checksums::compute_etag;
    use fakes3_storage::multipart::{CompletedPart, ListMultipartUploadsPage, ListPartsPage};
    use fakes3_storage::prefix::Prefix;
    use fakes3_storage::types::Metadata;

    use crate::{Engine, all_engines, read};

    fn upload_part(engine: &Engine, bucket: &str, key: &str, id: &str, n: u32, body: &[u8]) -> String {
        let mut input = body;
        engine
            .s3
            .upload_part(bucket, key, id, n, &mut input, body.len() as u64)
            .unwrap()
    }

    #[test]
    fn test_should_assemble_parts_in_numeric_order() {
        for engine in all_engines() {
            let bucket = engine.bucket("mpu");
            let mut metadata = Metadata::new();
            metadata.insert("origin".into(), "multipart".into());
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "big", metadata)
                .unwrap();

            // Uploaded out of order on purpose.
            let e2 = upload_part(&engine, &bucket, "big", &id, 2, b"-second");
            let e1 = upload_part(&engine, &bucket, "big", &id, 1, b"first");

            let result = engine
                .s3
                .complete_multipart_upload(
                    &bucket,
                    "big",
                    &id,
                    &[CompletedPart::new(1, e1), CompletedPart::new(2, e2)],
                )
                .unwrap();
            assert_eq!(result.etag, compute_etag(b"first-second"), "{}", engine.name);
            assert_eq!(read(&engine.s3, &bucket, "big"), b"first-second", "{}", engine.name);

            let head = engine.s3.head_object(&bucket, "big", None).unwrap();
            assert_eq!(head.metadata["origin"], "multipart", "{}", engine.name);

            let err = engine
                .s3
                .list_parts(&bucket, "big", &id, &ListPartsPage::default())
                .unwrap_err();
            assert_eq!(err.code(), "NoSuchUpload", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_reject_bad_completions() {
        for engine in all_engines() {
            let bucket = engine.bucket("badmpu");
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "obj", Metadata::new())
                .unwrap();
            let e1 = upload_part(&engine, &bucket, "obj", &id, 1, b"one");
            let e2 = upload_part(&engine, &bucket, "obj", &id, 2, b"two");

            let err = engine
                .s3
                .complete_multipart_upload(
                    &bucket,
                    "obj",
                    &id,
                    &[CompletedPart::new(2, e2.clone()), CompletedPart::new(1, e1.clone())],
                )
                .unwrap_err();
            assert_eq!(err.code(), "InvalidPartOrder", "{}", engine.name);

            let err = engine
                .s3
                .complete_multipart_upload(
                    &bucket,
                    "obj",
                    &id,
                    &[CompletedPart::new(1, e1.clone()), CompletedPart::new(2, "\"wrong\"")],
                )
                .unwrap_err();
            assert_eq!(err.code(), "InvalidPart", "{}", engine.name);

            let err = engine
                .s3
                .complete_multipart_upload(&bucket, "obj", &id, &[])
                .unwrap_err();
            assert_eq!(err.code(), "InvalidArgument", "{}", engine.name);

            // Nothing became visible and the upload is still usable.
            assert!(engine.s3.head_object(&bucket, "obj", None).is_err());
            engine
                .s3
                .complete_multipart_upload(
                    &bucket,
                    "obj",
                    &id,
                    &[CompletedPart::new(1, e1), CompletedPart::new(2, e2)],
                )
                .unwrap();
            assert_eq!(read(&engine.s3, &bucket, "obj"), b"onetwo");
        }
    }

    #[test]
    fn test_should_replace_part_with_same_number() {
        for engine in all_engines() {
            let bucket = engine.bucket("replace");
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "k", Metadata::new())
                .unwrap();
            upload_part(&engine, &bucket, "k", &id, 1, b"old part");
            let etag = upload_part(&engine, &bucket, "k", &id, 1, b"new");

            let parts = engine
                .s3
                .list_parts(&bucket, "k", &id, &ListPartsPage::default())
                .unwrap();
            assert_eq!(parts.parts.len(), 1, "{}", engine.name);
            assert_eq!(parts.parts[0].size, 3, "{}", engine.name);
            assert_eq!(parts.parts[0].etag, etag);

            engine
                .s3
                .complete_multipart_upload(&bucket, "k", &id, &[CompletedPart::new(1, etag)])
                .unwrap();
            assert_eq!(read(&engine.s3, &bucket, "k"), b"new", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_abort_upload() {
        for engine in all_engines() {
            let bucket = engine.bucket("abort");
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "k", Metadata::new())
                .unwrap();
            upload_part(&engine, &bucket, "k", &id, 1, b"discard me");
            engine.s3.abort_multipart_upload(&bucket, "k", &id).unwrap();

            let err = engine.s3.abort_multipart_upload(&bucket, "k", &id).unwrap_err();
            assert_eq!(err.code(), "NoSuchUpload", "{}", engine.name);
            let mut input: &[u8] = b"late";
            let err = engine
                .s3
                .upload_part(&bucket, "k", &id, 2, &mut input, 4)
                .unwrap_err();
            assert_eq!(err.code(), "NoSuchUpload", "{}", engine.name);
            assert!(engine.s3.head_object(&bucket, "k", None).is_err());
        }
    }

    #[test]
    fn test_should_list_uploads_and_parts() {
        for engine in all_engines() {
            let bucket = engine.bucket("listing");
            let a = engine
                .s3
                .create_multipart_upload(&bucket, "dir/a", Metadata::new())
                .unwrap();
            engine
                .s3
                .create_multipart_upload(&bucket, "dir/b", Metadata::new())
                .unwrap();
            engine
                .s3
                .create_multipart_upload(&bucket, "top", Metadata::new())
                .unwrap();

            let all = engine
                .s3
                .list_multipart_uploads(&bucket, &Prefix::none(), &ListMultipartUploadsPage::default())
                .unwrap();
            let keys: Vec<_> = all.uploads.iter().map(|u| u.key.as_str()).collect();
            assert_eq!(keys, vec!["dir/a", "dir/b", "top"], "{}", engine.name);

            let grouped = engine
                .s3
                .list_multipart_uploads(
                    &bucket,
                    &Prefix::new(Some(""), Some("/")),
                    &ListMultipartUploadsPage::default(),
                )
                .unwrap();
            assert_eq!(grouped.common_prefixes, vec!["dir/"], "{}", engine.name);
            assert_eq!(grouped.uploads.len(), 1);

            for n in 1..=3 {
                upload_part(&engine, &bucket, "dir/a", &a, n, format!("part{n}").as_bytes());
            }
            let page = ListPartsPage {
                part_number_marker: None,
                max_parts: Some(2),
            };
            let first = engine.s3.list_parts(&bucket, "dir/a", &a, &page).unwrap();
            assert_eq!(first.parts.len(), 2, "{}", engine.name);
            assert!(first.is_truncated);
            assert_eq!(first.next_part_number_marker, Some(2));

            let page = ListPartsPage {
                part_number_marker: Some(2),
                max_parts: Some(2),
            };
            let rest = engine.s3.list_parts(&bucket, "dir/a", &a, &page).unwrap();
            assert_eq!(rest.parts.len(), 1, "{}", engine.name);
            assert_eq!(rest.parts[0].part_number, 3);
            assert!(!rest.is_truncated);
        }
    }

    #[test]
    fn test_should_reject_out_of_range_part_numbers() {
        for engine in all_engines() {
            let bucket = engine.bucket("partno");
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "k", Metadata::new())
                .unwrap();
            for n in [0, 10_001] {
                let mut input: &[u8] = b"x";
                let err = engine
                    .s3
                    .upload_part(&bucket, "k", &id, n, &mut input, 1)
                    .unwrap_err();
                assert_eq!(err.code(), "InvalidArgument", "{} {n}", engine.name);
            }
        }
    }
}
