//! tokio_multipart - Tokio integration for shiguredo_multipart
//!
//! tokio の `AsyncRead` から multipart/form-data を読み取るライブラリ。
//!
//! ## 特徴
//!
//! - **shiguredo_multipart ベース**: Sans I/O デコーダーをベースにした設計
//! - **非同期 I/O**: tokio による完全非同期対応
//! - **背圧**: ファイルの読み出しが止まると入力の読み取りも止まる
//! - **tracing**: パートの開始と終了、制限到達をログに出力
//!
//! ## ストリーミング
//!
//! ```ignore
//! use tokio_multipart::{Event, Multipart, MultipartConfig};
//!
//! let config = MultipartConfig::from_content_type(content_type)?;
//! let (driver, mut events) = Multipart::new(body, config)?.into_parts();
//! tokio::spawn(driver.run());
//!
//! while let Some(event) = events.next().await {
//!     match event? {
//!         Event::Field(field) => println!("{} = {}", field.name, field.value),
//!         Event::File(mut file) => {
//!             while let Some(chunk) = file.stream.chunk().await {
//!                 output.write_all(&chunk?).await?;
//!             }
//!         }
//!         Event::LimitHit(limit) => println!("limit: {:?}", limit),
//!         Event::Finished => break,
//!     }
//! }
//! ```
//!
//! ## 一括読み取り
//!
//! ```ignore
//! let form = tokio_multipart::collect(body, config).await?;
//! let title = form.field("title");
//! ```

mod collect;
pub mod error;
mod multipart;

pub use collect::{CollectedFile, CollectedForm, collect};
pub use error::{Error, Result};
pub use multipart::{Driver, Event, Events, FileField, FileStream, Multipart};

// shiguredo_multipart の型を re-export
pub use shiguredo_multipart::{
    Field, FileId, FileInfo, Limit, MultipartConfig, MultipartError, MultipartLimits,
};
