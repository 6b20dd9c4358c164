//! Listing tests.

#[cfg(test)]
mod tests {
    use fakes3_storage::listing::ListBucketPage;
    use fakes3_storage::prefix::Prefix;
    use fakes3_storage::types::ObjectList;

    use crate::{Engine, all_engines, put};

    fn seed(engine: &Engine, keys: &[&str]) -> String {
        let bucket = engine.bucket("list");
        for key in keys {
            put(&engine.s3, &bucket, key, key.as_bytes()).unwrap();
        }
        bucket
    }

    fn list(engine: &Engine, bucket: &str, prefix: Option<&str>, delim: Option<&str>) -> ObjectList {
        engine
            .s3
            .list_bucket(bucket, &Prefix::new(prefix, delim), &ListBucketPage::default())
            .unwrap()
    }

    fn keys(list: &ObjectList) -> Vec<&str> {
        list.contents.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn test_should_group_by_delimiter() {
        for engine in all_engines() {
            let bucket = seed(&engine, &["a", "b", "test/yep"]);
            let result = list(&engine, &bucket, Some(""), Some("/"));
            assert_eq!(keys(&result), vec!["a", "b"], "{}", engine.name);
            assert_eq!(result.common_prefixes, vec!["test/"], "{}", engine.name);
            assert!(!result.is_truncated);
        }
    }

    #[test]
    fn test_should_list_everything_without_prefix() {
        for engine in all_engines() {
            let bucket = seed(&engine, &["a", "b", "test/yep", "test/deeper/z"]);
            let result = list(&engine, &bucket, None, Some("/"));
            assert_eq!(
                keys(&result),
                vec!["a", "b", "test/deeper/z", "test/yep"],
                "{}",
                engine.name
            );
            assert!(result.common_prefixes.is_empty(), "{}", engine.name);
        }
    }

    #[test]
    fn test_should_list_inside_a_prefix() {
        for engine in all_engines() {
            let bucket = seed(
                &engine,
                &["photos/2023/a.jpg", "photos/2024/b.jpg", "photos/cover.png", "videos/c.mp4"],
            );

            let result = list(&engine, &bucket, Some("photos/"), Some("/"));
            assert_eq!(keys(&result), vec!["photos/cover.png"], "{}", engine.name);
            assert_eq!(
                result.common_prefixes,
                vec!["photos/2023/", "photos/2024/"],
                "{}",
                engine.name
            );

            let partial = list(&engine, &bucket, Some("photos/20"), Some("/"));
            assert!(partial.contents.is_empty(), "{}", engine.name);
            assert_eq!(partial.common_prefixes.len(), 2, "{}", engine.name);

            let flat = list(&engine, &bucket, Some("photos/"), None);
            assert_eq!(flat.contents.len(), 3, "{}", engine.name);
            assert!(flat.common_prefixes.is_empty());
        }
    }

    #[test]
    fn test_should_group_by_other_delimiters() {
        for engine in all_engines() {
            let bucket = seed(&engine, &["log-2024-01", "log-2024-02", "logbook"]);
            let result = list(&engine, &bucket, Some("log"), Some("-"));
            assert_eq!(keys(&result), vec!["logbook"], "{}", engine.name);
            assert_eq!(result.common_prefixes, vec!["log-"], "{}", engine.name);
        }
    }

    #[test]
    fn test_should_report_etag_and_size() {
        for engine in all_engines() {
            let bucket = seed(&engine, &["sized"]);
            let result = list(&engine, &bucket, None, None);
            let entry = &result.contents[0];
            assert_eq!(entry.size, 5, "{}", engine.name);
            assert_eq!(
                entry.etag,
                fakes3_storage::checksums::compute_etag(b"sized"),
                "{}",
                engine.name
            );
        }
    }

    #[test]
    fn test_should_page_through_every_key() {
        let all = ["k1", "k2", "k3", "k4", "k5"];
        for engine in all_engines() {
            let bucket = seed(&engine, &all);
            let mut seen = Vec::new();
            let mut marker = None;
            loop {
                let page = ListBucketPage {
                    marker: marker.clone(),
                    max_keys: Some(2),
                };
                let result = engine.s3.list_bucket(&bucket, &Prefix::none(), &page).unwrap();
                seen.extend(result.contents.iter().map(|c| c.key.clone()));
                if !result.is_truncated {
                    break;
                }
                assert_eq!(result.contents.len(), 2, "{}", engine.name);
                marker = result.next_marker;
            }
            assert_eq!(seen, all, "{}", engine.name);
        }
    }

    #[test]
    fn test_should_count_prefixes_towards_page_size() {
        for engine in all_engines().into_iter().filter(Engine::paginates) {
            let bucket = seed(&engine, &["a/1", "a/2", "b/1", "c"]);
            let page = ListBucketPage {
                marker: None,
                max_keys: Some(2),
            };
            let first = engine
                .s3
                .list_bucket(&bucket, &Prefix::new(Some(""), Some("/")), &page)
                .unwrap();
            assert_eq!(first.common_prefixes, vec!["a/", "b/"], "{}", engine.name);
            assert!(first.is_truncated);
            assert_eq!(first.next_marker.as_deref(), Some("b/"));

            let page = ListBucketPage {
                marker: first.next_marker,
                max_keys: Some(2),
            };
            let second = engine
                .s3
                .list_bucket(&bucket, &Prefix::new(Some(""), Some("/")), &page)
                .unwrap();
            assert_eq!(keys(&second), vec!["c"], "{}", engine.name);
            assert!(!second.is_truncated);
        }
    }
}
