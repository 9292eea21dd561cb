//! フォーム全体をメモリに集める

use shiguredo_multipart::{Field, FileInfo, Limit, MultipartConfig};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::multipart::{Event, Multipart};

/// 集めたファイル
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub info: FileInfo,
    pub data: Vec<u8>,
    /// max_file_size で切り詰められたか
    pub truncated: bool,
}

/// 集めたフォーム
#[derive(Debug, Clone, Default)]
pub struct CollectedForm {
    pub fields: Vec<Field>,
    pub files: Vec<CollectedFile>,
    pub limits_hit: Vec<Limit>,
}

impl CollectedForm {
    /// 名前でフィールドを探す
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 名前でファイルを探す
    pub fn file(&self, name: &str) -> Option<&CollectedFile> {
        self.files.iter().find(|f| f.info.name == name)
    }
}

/// リーダーからフォームを読み切る
///
/// ファイルの中身もすべてメモリに載るため、制限を適切に設定すること。
pub async fn collect<R>(reader: R, config: MultipartConfig) -> Result<CollectedForm>
where
    R: AsyncRead + Unpin,
{
    let (driver, mut events) = Multipart::new(reader, config)?.into_parts();

    let consume = async move {
        let mut form = CollectedForm::default();
        while let Some(event) = events.next().await {
            match event? {
                Event::Field(field) => form.fields.push(field),
                Event::File(file) => {
                    let mut stream = file.stream;
                    let mut data = Vec::new();
                    while let Some(chunk) = stream.chunk().await {
                        data.extend_from_slice(&chunk?);
                    }
                    form.files.push(CollectedFile {
                        info: file.info,
                        data,
                        truncated: stream.is_truncated(),
                    });
                }
                Event::LimitHit(limit) => form.limits_hit.push(limit),
                Event::Finished => break,
            }
        }
        Ok::<_, crate::error::Error>(form)
    };

    let (driven, form) = tokio::join!(driver.run(), consume);
    driven?;
    form
}

#[cfg(test)]
mod tests {
    use shiguredo_multipart::encoder::MultipartBuilder;
    use shiguredo_multipart::{MultipartError, MultipartLimits};

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_collect() {
        let builder = MultipartBuilder::with_boundary("AaB03x")
            .text_field("title", "report")
            .file_field("doc", "dir/report.txt", "text/plain", b"contents")
            .file_field("empty", "e.bin", "application/octet-stream", b"");
        let body = builder.build();
        let config = MultipartConfig::from_content_type(&builder.content_type()).unwrap();

        let form = collect(&body[..], config).await.unwrap();
        assert_eq!(form.field("title").unwrap().value, "report");
        let doc = form.file("doc").unwrap();
        assert_eq!(doc.info.filename.as_deref(), Some("report.txt"));
        assert_eq!(doc.info.content_type, "text/plain");
        assert_eq!(doc.data, b"contents");
        assert!(!doc.truncated);
        assert!(form.file("empty").unwrap().data.is_empty());
        assert!(form.limits_hit.is_empty());
    }

    #[tokio::test]
    async fn test_collect_with_limits() {
        let body = MultipartBuilder::with_boundary("b")
            .text_field("a", "1")
            .text_field("b", "2")
            .file_field("f", "f.txt", "text/plain", b"abcdef")
            .build();
        let limits = MultipartLimits {
            max_fields: 1,
            max_file_size: 3,
            ..Default::default()
        };
        let config = MultipartConfig::new("b").unwrap().with_limits(limits);

        let form = collect(&body[..], config).await.unwrap();
        assert_eq!(form.fields.len(), 1);
        assert_eq!(form.files[0].data, b"abc");
        assert!(form.files[0].truncated);
        assert!(form.limits_hit.contains(&Limit::Fields));
        assert!(matches!(form.limits_hit.last(), Some(Limit::FileSize { .. })));
    }

    #[tokio::test]
    async fn test_collect_incomplete() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nno end";
        let result = collect(&body[..], MultipartConfig::new("b").unwrap()).await;
        assert!(matches!(
            result,
            Err(Error::Multipart(MultipartError::UnexpectedEnd))
        ));
    }
}
