impl SyncEngine {
    /// Lists a remote directory and materializes its children in the tree.
    pub async fn expand(&self, server: &str, dir: &str) -> Result<Vec<TreeNode>, EngineError> {
        let root = self.server(server)?;
        let dir = paths::checked_relative(dir)?;
        let listing = root.connector().list_directory(&root.remote_of(&dir)).await?;
        root.ensure_live()?;
        let listed = listing
            .into_iter()
            .filter(|entry| !entry.is_dot_entry())
            .filter_map(|entry| {
                let kind = ItemType::from_entry_type(entry.entry_type)?;
                let meta = NodeMeta {
                    size: (kind == ItemType::File).then_some(entry.size),
                    rights: entry.rights,
                };
                Some((entry.name, kind, meta))
            })
            .collect();
        root.tree().replace_children(&dir, listed);
        debug!(server, dir = %dir, "directory expanded");
        Ok(root.tree().children(&dir))
    }

    /// Hands the mirror copy to the editor, downloading it first unless an
    /// editor already holds it.
    pub async fn open(&self, entry: &Entry) -> Result<PathBuf, EngineError> {
        if self.editors.is_bound(&entry.local_path) {
            self.editor_host.focus(&entry.local_path);
            return Ok(entry.local_path.clone());
        }
        if entry.is_dir() {
            return Err(EngineError::NotImplemented("opening a directory"));
        }
        let root = self.server(&entry.server)?;
        self.download_file(&entry.server, &entry.remote_path, &entry.local_path, entry.size)
            .await?;
        root.ensure_live()?;
        self.present_in_editor(&root, &entry.relative_path, &entry.local_path)?;
        info!(server = %entry.server, path = %entry.relative_path, "opened for editing");
        Ok(entry.local_path.clone())
    }

    /// Shows a mirror file that is already on disk, binding it on first use.
    fn present_in_editor(
        &self,
        root: &ServerRoot,
        relative: &str,
        local: &Path,
    ) -> Result<(), EngineError> {
        if self.editors.is_bound(local) {
            self.editor_host.focus(local);
        } else {
            self.editor_host.open(local)?;
            self.editors.bind(local, root.name(), relative);
        }
        root.tree().set_open(relative, true);
        Ok(())
    }

    /// Save hook: re-uploads a bound mirror file. Paths no editor is bound to
    /// are ignored.
    pub async fn on_editor_saved(&self, local_path: &Path) -> Result<Option<QueueItem>, EngineError> {
        let Some(binding) = self.editors.get(local_path) else {
            debug!(path = %local_path.display(), "save of unbound file ignored");
            return Ok(None);
        };
        let root = self.server(&binding.server)?;
        let size = tokio::fs::metadata(local_path).await?.len();
        root.tree().set_size(&binding.relative_path, size);
        let remote = root.remote_of(&binding.relative_path);
        let item = self
            .upload_file(&binding.server, local_path, &remote, false)
            .await?;
        Ok(Some(item))
    }

    pub fn on_editor_closed(&self, local_path: &Path) -> bool {
        let Some(binding) = self.editors.unbind(local_path) else {
            return false;
        };
        if let Ok(root) = self.server(&binding.server) {
            root.tree().set_open(&binding.relative_path, false);
        }
        true
    }

    /// Refreshes an open file from the server; files nobody edits are left
    /// alone.
    pub async fn reload_file(&self, entry: &Entry) -> Result<Option<QueueItem>, EngineError> {
        if !self.editors.is_bound(&entry.local_path) {
            return Ok(None);
        }
        let item = self
            .download_file(&entry.server, &entry.remote_path, &entry.local_path, None)
            .await?;
        Ok(Some(item))
    }

    /// Creates `relative_path` below `parent` (both relative to the server
    /// base) and selects it.
    pub async fn create(
        &self,
        server: &str,
        parent: &str,
        relative_path: &str,
        kind: ItemType,
    ) -> Result<Entry, EngineError> {
        let root = self.server(server)?;
        let relative = paths::checked_relative(&paths::join(parent, relative_path))?;
        let remote = root.remote_of(&relative);
        if relative == "/" {
            return Err(EngineError::AlreadyExists(remote));
        }
        let local = root.local_of(&relative)?;
        info!(server, remote = %remote, ?kind, "create requested");

        match kind {
            ItemType::Dir => tokio::fs::create_dir_all(&local).await?,
            ItemType::File => {
                if let Some(parent) = local.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&local)
                    .await?;
            }
        }

        if self.remote_kind(&root, &remote).await?.is_some() {
            warn!(server, remote = %remote, "create target already exists");
            return Err(EngineError::AlreadyExists(remote));
        }

        match kind {
            ItemType::Dir => {
                root.connector().create_directory(&remote).await?;
                root.ensure_live()?;
                root.finder().add_directory(&relative);
                root.tree().add_directory(&relative, NodeMeta::default());
            }
            ItemType::File => {
                let item = self.upload_file(server, &local, &remote, false).await?;
                root.tree().add_file(&relative, NodeMeta::file(item.size));
            }
        }
        root.tree().select(&relative);
        Ok(root.entry(&relative)?)
    }

    /// Renames an entry on the server, then follows the rename in both
    /// caches, open editors and the local mirror.
    pub async fn rename(&self, entry: &Entry, new_relative: &str) -> Result<Entry, EngineError> {
        let new_relative = paths::checked_relative(new_relative)?;
        if new_relative == entry.relative_path {
            return Ok(entry.clone());
        }
        let root = self.server(&entry.server)?;
        let new_remote = root.remote_of(&new_relative);
        info!(server = %entry.server, from = %entry.remote_path, to = %new_remote, "rename requested");

        root.connector().rename(&entry.remote_path, &new_remote).await?;
        root.ensure_live()?;
        self.apply_rename(&root, entry, &new_relative).await
    }

    /// Cut/paste and drag-drop within one server. The moved object is looked
    /// up by path; without a materialized node its size and rights are
    /// unknown.
    pub async fn move_path(
        &self,
        server: &str,
        src_remote: &str,
        dest_remote: &str,
    ) -> Result<Entry, EngineError> {
        let root = self.server(server)?;
        let src_relative = root.relative_of(src_remote)?;
        let dest_relative = root.relative_of(dest_remote)?;
        if src_relative == dest_relative {
            return Ok(root.entry(&src_relative)?);
        }
        let src = root.remote_of(&src_relative);
        let dest = root.remote_of(&dest_relative);
        info!(server, from = %src, to = %dest, "move requested");

        let old = match root.tree().get(&src_relative) {
            Some(node) => root.entry_for(&node)?,
            None => {
                let kind = if let Some(item) = root.finder().get(&src_relative) {
                    item.item_type
                } else if src_remote.ends_with('/')
                    || root.connector().exists_directory(&src).await?
                {
                    ItemType::Dir
                } else {
                    ItemType::File
                };
                Entry {
                    server: server.to_string(),
                    remote_path: src.clone(),
                    local_path: root.local_of(&src_relative)?,
                    relative_path: src_relative.clone(),
                    kind,
                    size: None,
                    rights: None,
                }
            }
        };

        if let Some(kind) = self.remote_kind(&root, &dest).await? {
            self.confirm_overwrite(&root, &dest, kind).await?;
        }
        root.connector().rename(&src, &dest).await?;
        root.ensure_live()?;
        self.apply_rename(&root, &old, &dest_relative).await
    }

    /// Copies a file and opens the duplicate. Copying onto itself picks the
    /// first free numbered name next to it (`report.txt` becomes
    /// `report0.txt`, `report1.txt`, ...). The bytes travel through a staging
    /// file outside the server mirror.
    pub async fn copy(
        &self,
        server: &str,
        src_remote: &str,
        dest_remote: &str,
        kind: ItemType,
    ) -> Result<Entry, EngineError> {
        if kind == ItemType::Dir {
            return Err(EngineError::NotImplemented("directory copy"));
        }
        let root = self.server(server)?;
        let src_relative = root.relative_of(src_remote)?;
        let mut dest_relative = root.relative_of(dest_remote)?;

        if src_relative == dest_relative {
            let parent = paths::dirname(&src_relative);
            let siblings: HashSet<String> = root
                .connector()
                .list_directory(&root.remote_of(&parent))
                .await?
                .into_iter()
                .filter(|entry| entry.is_file())
                .map(|entry| entry.name)
                .collect();
            let name = paths::basename(&src_relative);
            let mut counter = 0u32;
            let mut candidate = paths::suffixed_name(name, counter);
            while siblings.contains(&candidate) {
                counter += 1;
                candidate = paths::suffixed_name(name, counter);
            }
            dest_relative = paths::canonical(&paths::join(&parent, &candidate));
            debug!(server, name = %candidate, "copy in place renamed");
        }

        let src = root.remote_of(&src_relative);
        let dest = root.remote_of(&dest_relative);
        info!(server, from = %src, to = %dest, "copy requested");
        if let Some(existing) = self.remote_kind(&root, &dest).await? {
            self.confirm_overwrite(&root, &dest, existing).await?;
        }

        let size = root
            .tree()
            .get(&src_relative)
            .and_then(|node| node.size)
            .or_else(|| root.finder().get(&src_relative).map(|item| item.size));
        let dest_local = root.local_of(&dest_relative)?;
        let staging = paths::local_path_for(
            &self.mirror_dir.join(COPY_STAGING_DIR).join(paths::sanitize_segment(server)),
            &dest_relative,
        )?;
        let transferred = async {
            self.download_file(server, &src, &staging, size).await?;
            self.upload_file(server, &staging, &dest, false).await?;
            root.ensure_live()?;
            if let Some(parent) = dest_local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&staging, &dest_local).await?;
            Ok::<(), EngineError>(())
        };
        if let Err(err) = transferred.await {
            remove_local_best_effort(&staging).await;
            return Err(err);
        }
        self.present_in_editor(&root, &dest_relative, &dest_local)?;
        Ok(root.entry(&dest_relative)?)
    }

    /// Deletes an entry after confirmation. The local mirror copy is removed
    /// best-effort; the remote deletion stands either way.
    pub async fn delete(&self, entry: &Entry) -> Result<(), EngineError> {
        let root = self.server(&entry.server)?;
        let answer = self
            .prompt
            .confirm("Delete permanently?", &entry.remote_path)
            .await;
        if answer == Confirmation::Cancel {
            info!(server = %entry.server, path = %entry.remote_path, "delete declined");
            return Err(EngineError::UserDeclined);
        }
        root.ensure_live()?;

        match entry.kind {
            ItemType::Dir => {
                root.connector()
                    .delete_directory(&entry.remote_path, true)
                    .await?
            }
            ItemType::File => root.connector().delete_file(&entry.remote_path).await?,
        }
        root.ensure_live()?;

        match entry.kind {
            ItemType::Dir => root.finder().delete_directory(&entry.relative_path),
            ItemType::File => root.finder().delete_file(&entry.relative_path),
        }
        remove_local_best_effort(&entry.local_path).await;
        if let Some(parent) = entry.parent() {
            root.tree().select(&parent);
        }
        root.tree().remove(&entry.relative_path);
        info!(server = %entry.server, path = %entry.remote_path, "deleted");
        Ok(())
    }

    pub async fn chmod(&self, entry: &Entry, mode: u32) -> Result<Rights, EngineError> {
        let root = self.server(&entry.server)?;
        match entry.kind {
            ItemType::Dir => {
                root.connector()
                    .chmod_directory(&entry.remote_path, mode)
                    .await?
            }
            ItemType::File => root.connector().chmod_file(&entry.remote_path, mode).await?,
        }
        root.ensure_live()?;
        let rights = Rights::from_octal(mode);
        root.tree().set_rights(&entry.relative_path, rights);
        info!(server = %entry.server, path = %entry.remote_path, %rights, "permissions changed");
        Ok(rights)
    }

    /// Cache, editor and mirror bookkeeping after a successful remote rename.
    async fn apply_rename(
        &self,
        root: &ServerRoot,
        old: &Entry,
        new_relative: &str,
    ) -> Result<Entry, EngineError> {
        let new_local = root.local_of(new_relative)?;
        let size = old
            .size
            .or_else(|| root.finder().get(&old.relative_path).map(|item| item.size));

        match old.kind {
            ItemType::Dir => root
                .finder()
                .rename_directory(&old.relative_path, new_relative),
            ItemType::File => {
                root.finder()
                    .rename_file(&old.relative_path, new_relative, size.unwrap_or(0))
            }
        }

        let was_open = root
            .tree()
            .get(&old.relative_path)
            .is_some_and(|node| node.open);
        let meta = NodeMeta {
            size: old.size,
            rights: old.rights,
        };
        if Self::tree_add(root, new_relative, old.kind, meta) && was_open {
            root.tree().set_open(new_relative, true);
        }

        let moved = self.editors.rebind(&old.local_path, &new_local, |relative| {
            paths::rebase(relative, &old.relative_path, new_relative)
        });
        for (from, to) in &moved {
            self.editor_host.retarget(from, to);
            if let Ok(relative) = root.relative_of_local(to) {
                root.tree().set_open(&relative, true);
            }
        }

        if tokio::fs::symlink_metadata(&old.local_path).await.is_ok() {
            let moved_on_disk = async {
                if let Some(parent) = new_local.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::rename(&old.local_path, &new_local).await
            };
            if let Err(err) = moved_on_disk.await {
                warn!(
                    from = %old.local_path.display(),
                    to = %new_local.display(),
                    error = %err,
                    "failed to move local mirror copy"
                );
            }
        }

        root.tree().remove(&old.relative_path);
        info!(
            server = root.name(),
            from = %old.relative_path,
            to = new_relative,
            editors = moved.len(),
            "rename applied"
        );
        Ok(Entry {
            server: old.server.clone(),
            relative_path: new_relative.to_string(),
            remote_path: root.remote_of(new_relative),
            local_path: new_local,
            kind: old.kind,
            size,
            rights: old.rights,
        })
    }
}
