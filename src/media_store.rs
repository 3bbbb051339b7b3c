use crate::domain::LetterSlug;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Disk-backed media store. Uploaded files live under
/// `{root}/staged/{upload_id}/` until payment, then move to
/// `{root}/letters/{slug}/` where they are served from `/media/letters/…`.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaStoreError {
    #[error("No staged media found for upload `{0}`")]
    UploadNotFound(Uuid),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Directory served under `/media`.
    pub fn public_root(&self) -> PathBuf {
        self.root.clone()
    }

    pub async fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join("staged")).await?;
        fs::create_dir_all(self.root.join("letters")).await?;
        Ok(())
    }

    /// Replaces a client-supplied file name with `{uuid}.{ext}`, keeping
    /// only a short alphanumeric extension.
    pub fn sanitized_file_name(original: &str) -> String {
        let extension = Path::new(original)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|ext| ext.to_lowercase());

        match extension {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        }
    }

    pub async fn stage(
        &self,
        upload_id: Uuid,
        file_name: &str,
        contents: &[u8],
    ) -> Result<(), MediaStoreError> {
        let dir = self.staged_dir(upload_id);
        fs::create_dir_all(&dir).await?;

        let mut file = fs::File::create(dir.join(file_name)).await?;
        file.write_all(contents).await?;
        file.flush().await?;

        Ok(())
    }

    /// Moves every staged file of `upload_id` under the letter's public
    /// directory and removes the staging directory.
    pub async fn promote(
        &self,
        upload_id: Uuid,
        slug: &LetterSlug,
        file_names: &[String],
    ) -> Result<(), MediaStoreError> {
        let staged = self.staged_dir(upload_id);
        if !fs::try_exists(&staged).await? {
            return Err(MediaStoreError::UploadNotFound(upload_id));
        }

        let published = self.letter_dir(slug);
        fs::create_dir_all(&published).await?;

        for file_name in file_names {
            fs::rename(staged.join(file_name), published.join(file_name)).await?;
        }

        fs::remove_dir_all(&staged).await?;

        Ok(())
    }

    pub async fn discard(&self, upload_id: Uuid) -> Result<(), MediaStoreError> {
        let staged = self.staged_dir(upload_id);
        if fs::try_exists(&staged).await? {
            fs::remove_dir_all(&staged).await?;
        }

        Ok(())
    }

    pub fn public_url(base_url: &str, slug: &LetterSlug, file_name: &str) -> String {
        format!("{}/media/letters/{slug}/{file_name}", base_url)
    }

    fn staged_dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join("staged").join(upload_id.to_string())
    }

    fn letter_dir(&self, slug: &LetterSlug) -> PathBuf {
        self.root.join("letters").join(slug.as_ref())
    }
}
