//! Error taxonomy tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::ErrorKind;
    use fakes3_storage::multipart::CompletedPart;
    use fakes3_storage::types::VersionId;

    use crate::{all_engines, put, versioned_engines};

    #[test]
    fn test_should_name_the_missing_resource() {
        for engine in all_engines() {
            let bucket = engine.bucket("err");
            let err = engine.s3.get_object(&bucket, "absent/key", None, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", engine.name);
            assert_eq!(err.code(), "NoSuchKey");
            assert_eq!(err.resource(), Some("absent/key"));
        }
    }

    #[test]
    fn test_should_classify_unsupported_capabilities() {
        for engine in all_engines() {
            let bucket = engine.bucket("cap");
            put(&engine.s3, &bucket, "k", b"v").unwrap();
            let versioned = engine.s3.get_object(&bucket, "k", Some(&VersionId::new("v")), None);
            if engine.s3.backend().as_versioned().is_none() {
                let err = versioned.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::NotImplemented, "{}", engine.name);
            }
            // Engines without multipart support get it staged by the facade.
            let upload = engine.s3.list_parts(&bucket, "k", "nope", &Default::default());
            assert_eq!(upload.unwrap_err().code(), "NoSuchUpload", "{}", engine.name);
        }
        assert!(!versioned_engines().is_empty());
    }

    #[test]
    fn test_should_leave_state_untouched_on_failed_completion() {
        for engine in all_engines() {
            let bucket = engine.bucket("failclosed");
            put(&engine.s3, &bucket, "k", b"original").unwrap();
            let id = engine
                .s3
                .create_multipart_upload(&bucket, "k", Default::default())
                .unwrap();
            let mut body: &[u8] = b"part";
            engine.s3.upload_part(&bucket, "k", &id, 1, &mut body, 4).unwrap();

            let err = engine
                .s3
                .complete_multipart_upload(&bucket, "k", &id, &[CompletedPart::new(1, "\"bogus\"")])
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", engine.name);
            assert_eq!(crate::read(&engine.s3, &bucket, "k"), b"original");
        }
    }
}
