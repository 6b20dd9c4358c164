//! Bucket lifecycle tests.

#[cfg(test)]
mod tests {
    use crate::{all_engines, put, test_bucket_name};

    #[test]
    fn test_should_create_list_and_delete_bucket() {
        for engine in all_engines().into_iter().filter(|e| e.manages_buckets()) {
            let s3 = &engine.s3;
            let name = test_bucket_name("life");
            s3.create_bucket(&name).expect("create bucket");
            assert!(s3.bucket_exists(&name).unwrap(), "{}", engine.name);

            let listed: Vec<_> = s3.list_buckets().unwrap().into_iter().map(|b| b.name).collect();
            assert!(listed.contains(&name), "{}", engine.name);

            s3.delete_bucket(&name).expect("delete bucket");
            assert!(!s3.bucket_exists(&name).unwrap(), "{}", engine.name);
        }
    }

    #[test]
    fn test_should_list_buckets_sorted_by_name() {
        for engine in all_engines().into_iter().filter(|e| e.manages_buckets()) {
            for name in ["charlie", "alpha", "bravo"] {
                engine.s3.create_bucket(name).unwrap();
            }
            let names: Vec<_> = engine
                .s3
                .list_buckets()
                .unwrap()
                .into_iter()
                .map(|b| b.name)
                .collect();
            assert_eq!(names, vec!["alpha", "bravo", "charlie"], "{}", engine.name);
        }
    }

    #[test]
    fn test_should_reject_duplicate_bucket() {
        for engine in all_engines().into_iter().filter(|e| e.manages_buckets()) {
            let bucket = engine.bucket("dup");
            let err = engine.s3.create_bucket(&bucket).unwrap_err();
            assert_eq!(err.code(), "BucketAlreadyExists", "{}", engine.name);
        }
    }

    #[test]
    fn test_should_refuse_to_delete_non_empty_bucket() {
        for engine in all_engines().into_iter().filter(|e| e.manages_buckets()) {
            let s3 = &engine.s3;
            let bucket = engine.bucket("full");
            put(s3, &bucket, "dir/file.txt", b"data").unwrap();

            let err = s3.delete_bucket(&bucket).unwrap_err();
            assert_eq!(err.code(), "BucketNotEmpty", "{}", engine.name);

            s3.delete_object(&bucket, "dir/file.txt", None).unwrap();
            s3.delete_bucket(&bucket).expect("delete emptied bucket");
        }
    }

    #[test]
    fn test_should_report_missing_bucket() {
        for engine in all_engines() {
            let s3 = &engine.s3;
            let missing = test_bucket_name("gone");
            assert!(!s3.bucket_exists(&missing).unwrap(), "{}", engine.name);
            assert_eq!(
                s3.get_object(&missing, "k", None, None).unwrap_err().code(),
                "NoSuchBucket",
                "{}",
                engine.name
            );
            assert_eq!(
                put(s3, &missing, "k", b"v").unwrap_err().code(),
                "NoSuchBucket",
                "{}",
                engine.name
            );
            if engine.manages_buckets() {
                assert_eq!(
                    s3.delete_bucket(&missing).unwrap_err().code(),
                    "NoSuchBucket",
                    "{}",
                    engine.name
                );
            }
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for engine in all_engines() {
            for name in ["ab", "UPPER", "under_score", "192.168.1.1", "-dash"] {
                let err = engine.s3.create_bucket(name).unwrap_err();
                assert_eq!(err.code(), "InvalidBucketName", "{} {name}", engine.name);
            }
        }
    }

    #[test]
    fn test_should_expose_single_fixed_bucket() {
        for engine in all_engines().into_iter().filter(|e| !e.manages_buckets()) {
            let buckets = engine.s3.list_buckets().unwrap();
            assert_eq!(buckets.len(), 1);
            assert_eq!(buckets[0].name, crate::SINGLE_BUCKET);
            let err = engine.s3.create_bucket("another-bucket").unwrap_err();
            assert_eq!(err.code(), "NotImplemented");
        }
    }
}
