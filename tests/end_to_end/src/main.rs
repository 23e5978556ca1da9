fn main() {
    println!("Run `cargo test -p end-to-end` to execute the cross-crate scenarios.");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::{TimeDelta, Utc};
    use chunkvault_bot_pool::{AccountPool, BotAccount, MemoryBackend};
    use chunkvault_metadata::{DiskStore, MemoryStore, MetadataStore, spawn_sweeper};
    use chunkvault_protocol::{FileId, FileRecord};
    use chunkvault_transfer::{ChunkSplitter, FileService, TransferConfig, TransferError};
    use tokio_util::sync::CancellationToken;

    const MB: usize = 1024 * 1024;
    const DEST: i64 = -100_777;
    const BOTS: [&str; 3] = ["bot_a", "bot_b", "bot_c"];

    fn pool(backend: &MemoryBackend) -> Arc<AccountPool> {
        Arc::new(AccountPool::from_accounts(
            BOTS.iter()
                .map(|id| Arc::new(backend.account(id)) as Arc<dyn BotAccount>)
                .collect(),
        ))
    }

    fn service(backend: &MemoryBackend, store: Arc<dyn MetadataStore>) -> FileService {
        FileService::new(pool(backend), store, TransferConfig::default())
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i * 7 % 256) as u8).collect::<Vec<u8>>())
    }

    /// Uploads `data` split at `chunk_size`, sending chunks in `order`.
    async fn upload_in_order(
        service: &FileService,
        name: &str,
        data: &Bytes,
        chunk_size: usize,
        order: &[u32],
    ) -> FileId {
        let record = service
            .init_upload(name, data.len() as i64, "application/octet-stream")
            .await
            .unwrap();
        let chunks: Vec<(u32, Bytes)> =
            ChunkSplitter::new(data.clone(), chunk_size).collect();
        assert_eq!(chunks.len(), order.len());

        for &seq in order {
            let (_, bytes) = &chunks[seq as usize];
            service
                .upload_chunk(record.id, seq, bytes.clone(), DEST)
                .await
                .unwrap();
        }
        service.complete_upload(record.id).await.unwrap();
        record.id
    }

    async fn download(service: &FileService, id: FileId) -> Vec<u8> {
        let mut out = Vec::new();
        service.assemble(id, &mut out).await.unwrap();
        out
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn twenty_five_megabytes_in_ten_megabyte_chunks() {
        let backend = MemoryBackend::new();
        let store = Arc::new(MemoryStore::new());
        let service = service(&backend, store.clone());
        let data = payload(25 * MB);

        let id = upload_in_order(&service, "video.bin", &data, 10 * MB, &[2, 0, 1]).await;

        let record = service.get_metadata(id).await.unwrap();
        assert!(record.is_completed());
        let sizes: Vec<u64> = record.ordered_chunks().iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![10 * MB as u64, 10 * MB as u64, 5 * MB as u64]);

        // Three uploads rotate over three accounts.
        let owners: HashSet<String> = record.chunks.iter().map(|c| c.owner.clone()).collect();
        assert_eq!(owners.len(), 3);

        let out = download(&service, id).await;
        assert_eq!(out.len(), 25 * MB);
        assert!(out == data.as_ref());
        assert_eq!(backend.fetch_count(), 3);
    }

    #[tokio::test]
    async fn round_trip_in_any_upload_order() {
        let backend = MemoryBackend::new();
        let service = service(&backend, Arc::new(MemoryStore::new()));
        let data = payload(4_500);

        let orders: [&[u32]; 4] = [
            &[0, 1, 2, 3, 4],
            &[4, 3, 2, 1, 0],
            &[2, 4, 0, 3, 1],
            &[1, 0, 3, 2, 4],
        ];
        for (i, order) in orders.iter().enumerate() {
            let id = upload_in_order(&service, &format!("f{i}"), &data, 1_000, order).await;
            assert_eq!(download(&service, id).await, data.to_vec(), "order {order:?}");
        }

        let listed = service.list_files().await.unwrap();
        assert_eq!(listed.len(), 4);
        assert!(
            listed
                .windows(2)
                .all(|w| w[0].created_at >= w[1].created_at)
        );
    }

    #[tokio::test]
    async fn whole_payload_upload_splits_and_reassembles() {
        let backend = MemoryBackend::new();
        let config = TransferConfig {
            upload_chunk_size: 64 * 1024,
            ..TransferConfig::default()
        };
        let service = FileService::new(pool(&backend), Arc::new(MemoryStore::new()), config);
        let data = payload(MB + 123);

        let record = service
            .upload_bytes("archive.tar", "application/x-tar", data.clone(), DEST)
            .await
            .unwrap();
        assert!(record.is_completed());
        assert_eq!(record.ordered_chunks().len(), 17);
        assert_eq!(download(&service, record.id).await, data.to_vec());
    }

    #[tokio::test]
    async fn repeated_chunk_upload_is_not_resent() {
        let backend = MemoryBackend::new();
        let service = service(&backend, Arc::new(MemoryStore::new()));
        let record = service.init_upload("a.bin", 6, "").await.unwrap();

        let first = service
            .upload_chunk(record.id, 0, Bytes::from_static(b"abcdef"), DEST)
            .await
            .unwrap();
        let again = service
            .upload_chunk(record.id, 0, Bytes::from_static(b"abcdef"), DEST)
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(backend.send_count(), 1);
    }

    #[tokio::test]
    async fn pending_file_cannot_be_downloaded() {
        let backend = MemoryBackend::new();
        let service = service(&backend, Arc::new(MemoryStore::new()));
        let record = service.init_upload("a.bin", 3, "").await.unwrap();
        service
            .upload_chunk(record.id, 0, Bytes::from_static(b"abc"), DEST)
            .await
            .unwrap();

        let mut out = Vec::new();
        let err = service.assemble(record.id, &mut out).await.unwrap_err();
        assert!(matches!(err, TransferError::NotCompleted(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn disk_store_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let data = payload(10_000);

        let id = {
            let store = DiskStore::open(tmp.path()).await.unwrap();
            let service = service(&backend, Arc::new(store));
            upload_in_order(&service, "kept.bin", &data, 3_000, &[3, 1, 0, 2]).await
        };
        assert!(tmp.path().join(format!("{id}.json")).exists());

        let store = DiskStore::open(tmp.path()).await.unwrap();
        let service = service(&backend, Arc::new(store));
        let record = service.get_metadata(id).await.unwrap();
        assert!(record.is_completed());
        assert_eq!(record.name, "kept.bin");
        assert_eq!(download(&service, id).await, data.to_vec());
    }

    fn age(record: &mut FileRecord, hours: i64) {
        record.created_at = Utc::now() - TimeDelta::hours(hours);
        record.updated_at = record.created_at;
    }

    fn document_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "json")
            })
            .count()
    }

    #[tokio::test]
    async fn sweeper_removes_abandoned_uploads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(DiskStore::open(tmp.path()).await.unwrap());

        let mut abandoned = FileRecord::new_pending("abandoned", 10, "");
        age(&mut abandoned, 30);
        let mut finished = FileRecord::new_pending("finished", 10, "");
        age(&mut finished, 30);
        let fresh = FileRecord::new_pending("fresh", 10, "");
        let (abandoned_id, finished_id, fresh_id) = (abandoned.id, finished.id, fresh.id);

        store.insert(abandoned).await.unwrap();
        store.insert(finished).await.unwrap();
        store.mark_completed(finished_id).await.unwrap();
        store.insert(fresh).await.unwrap();
        assert_eq!(document_count(tmp.path()), 3);

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            store.clone(),
            Duration::from_secs(24 * 3600),
            Duration::from_millis(20),
            cancel.clone(),
        );
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.get(abandoned_id).await.is_err());
        assert!(store.get(finished_id).await.is_ok());
        assert!(store.get(fresh_id).await.is_ok());
        assert_eq!(document_count(tmp.path()), 2);
    }
}
