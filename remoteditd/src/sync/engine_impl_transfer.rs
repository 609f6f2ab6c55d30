impl SyncEngine {
    /// Pushes one local file to `dest_remote`.
    ///
    /// With `check_exists`, an existing destination is offered for overwrite
    /// first; declining leaves the remote, the caches and the queue untouched.
    pub async fn upload_file(
        &self,
        server: &str,
        src_local: &Path,
        dest_remote: &str,
        check_exists: bool,
    ) -> Result<QueueItem, EngineError> {
        let root = self.server(server)?;
        if self.queue.exists(server, src_local) {
            return Err(EngineError::AlreadyQueued(src_local.to_path_buf()));
        }
        let relative = root.relative_of(dest_remote)?;
        let remote = root.remote_of(&relative);
        let size = tokio::fs::metadata(src_local).await?.len();
        info!(server, local = %src_local.display(), remote = %remote, "upload requested");

        if check_exists && let Some(kind) = self.remote_kind(&root, &remote).await? {
            self.confirm_overwrite(&root, &remote, kind).await?;
        }
        root.ensure_live()?;

        // The marker belongs to whichever transfer got into the queue.
        let item = self
            .queue
            .enqueue(server, Direction::Upload, &remote, src_local, size)?;
        let syncing = root.find_by_local_path(src_local).map(|node| node.relative_path);
        let clear_syncing = || {
            if let Some(path) = &syncing {
                root.tree().set_syncing(path, false);
            }
        };
        if let Some(path) = &syncing {
            root.tree().set_syncing(path, true);
        }
        self.queue.mark_in_progress(item.id);

        let result = match root.connector().upload_file(&item.transfer_request()).await {
            Ok(()) => root.ensure_live(),
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => {
                root.finder().delete_file(&relative);
                root.finder().add_file(&relative, size);
                Self::tree_add(&root, &relative, ItemType::File, NodeMeta::file(size));
                clear_syncing();
                self.queue.mark_done(item.id);
                info!(server, remote = %remote, bytes = size, "upload finished");
                Ok(self.queue.get(item.id).unwrap_or(item))
            }
            Err(err) => {
                self.queue.mark_error(item.id, &err.to_string());
                clear_syncing();
                warn!(server, remote = %remote, error = %err, "upload failed");
                Err(err)
            }
        }
    }

    /// Fetches one remote file into `dest_local`. A destination that already
    /// has an outstanding transfer is rejected before anything happens.
    pub async fn download_file(
        &self,
        server: &str,
        src_remote: &str,
        dest_local: &Path,
        size: Option<u64>,
    ) -> Result<QueueItem, EngineError> {
        let root = self.server(server)?;
        if self.queue.exists(server, dest_local) {
            return Err(EngineError::AlreadyQueued(dest_local.to_path_buf()));
        }
        let relative = root.relative_of(src_remote)?;
        let remote = root.remote_of(&relative);
        let size = size
            .or_else(|| root.tree().get(&relative).and_then(|node| node.size))
            .or_else(|| root.finder().get(&relative).map(|item| item.size))
            .unwrap_or(0);
        info!(server, remote = %remote, local = %dest_local.display(), "download requested");

        if let Some(parent) = dest_local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let item = self
            .queue
            .enqueue(server, Direction::Download, &remote, dest_local, size)?;
        root.tree().set_syncing(&relative, true);
        self.queue.mark_in_progress(item.id);

        let result = match root.connector().download_file(&item.transfer_request()).await {
            Ok(()) => root.ensure_live(),
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => {
                if let Ok(meta) = tokio::fs::metadata(dest_local).await {
                    root.tree().set_size(&relative, meta.len());
                }
                root.tree().set_syncing(&relative, false);
                self.queue.mark_done(item.id);
                info!(server, remote = %remote, "download finished");
                Ok(self.queue.get(item.id).unwrap_or(item))
            }
            Err(err) => {
                self.queue.mark_error(item.id, &err.to_string());
                root.tree().set_syncing(&relative, false);
                warn!(server, remote = %remote, error = %err, "download failed");
                Err(err)
            }
        }
    }

    /// Uploads a local directory tree one file at a time. Files sent before a
    /// failure stay on the server.
    pub async fn upload_directory(
        &self,
        server: &str,
        src_local: &Path,
        dest_remote: &str,
    ) -> Result<Vec<QueueItem>, EngineError> {
        let root = self.server(server)?;
        let dest_relative = root.relative_of(dest_remote)?;
        info!(server, local = %src_local.display(), remote = dest_remote, "directory upload requested");

        let walk_root = src_local.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || {
            WalkDir::new(&walk_root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .map(|entry| {
                    entry
                        .map(|entry| (entry.path().to_path_buf(), entry.file_type().is_dir()))
                        .map_err(io::Error::from)
                })
                .collect::<Result<Vec<_>, io::Error>>()
        })
        .await
        .map_err(io::Error::other)??;

        self.create_remote_directory(&root, &dest_relative).await?;
        let mut items = Vec::new();
        for (path, is_dir) in entries {
            let relative = paths::canonical(&paths::join(
                &dest_relative,
                &relative_from_walk(src_local, &path),
            ));
            if is_dir {
                self.create_remote_directory(&root, &relative).await?;
            } else {
                let remote = root.remote_of(&relative);
                items.push(self.upload_file(server, &path, &remote, false).await?);
            }
        }
        info!(server, remote = dest_remote, files = items.len(), "directory upload finished");
        Ok(items)
    }

    /// Downloads a remote directory tree one file at a time, mirroring its
    /// layout under `dest_local`.
    pub async fn download_directory(
        &self,
        server: &str,
        src_remote: &str,
        dest_local: &Path,
    ) -> Result<Vec<QueueItem>, EngineError> {
        let root = self.server(server)?;
        let src_relative = root.relative_of(src_remote)?;
        info!(server, remote = src_remote, local = %dest_local.display(), "directory download requested");

        tokio::fs::create_dir_all(dest_local).await?;
        let mut pending = VecDeque::from([(src_relative, dest_local.to_path_buf())]);
        let mut items = Vec::new();
        while let Some((dir, local_dir)) = pending.pop_front() {
            root.ensure_live()?;
            let mut listing = root.connector().list_directory(&root.remote_of(&dir)).await?;
            listing.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in listing {
                if entry.is_dot_entry() {
                    continue;
                }
                let child = paths::canonical(&paths::join(&dir, &entry.name));
                let local_child = local_dir.join(&entry.name);
                match entry.entry_type {
                    EntryType::Dir => {
                        tokio::fs::create_dir_all(&local_child).await?;
                        pending.push_back((child, local_child));
                    }
                    EntryType::File => {
                        let remote = root.remote_of(&child);
                        items.push(
                            self.download_file(server, &remote, &local_child, Some(entry.size))
                                .await?,
                        );
                    }
                    EntryType::Link => {
                        debug!(server, path = %child, "skipping link in directory download");
                    }
                }
            }
        }
        info!(server, remote = src_remote, files = items.len(), "directory download finished");
        Ok(items)
    }

    async fn create_remote_directory(
        &self,
        root: &ServerRoot,
        relative: &str,
    ) -> Result<(), EngineError> {
        root.ensure_live()?;
        root.connector()
            .create_directory(&root.remote_of(relative))
            .await?;
        root.ensure_live()?;
        root.finder().add_directory(relative);
        Self::tree_add(root, relative, ItemType::Dir, NodeMeta::default());
        Ok(())
    }
}
