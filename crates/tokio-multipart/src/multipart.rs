//! AsyncRead から multipart/form-data を読み取る
//!
//! [`Driver`] が入力を読んでデコーダーに投入し、結果を [`Events`] へ送ります。
//! ファイルパートのボディはパートごとの bounded チャネル ([`FileStream`]) で届きます。
//!
//! ファイルの読み出しが止まるとチャネルが埋まり、Driver は入力の読み取りを止めます。
//! 受け取った [`FileStream`] は最後まで読むか drop してください。
//! [`Event::Finished`] はすべての [`FileStream`] が終わってから届きます。

use shiguredo_multipart::{
    Field, FileId, FileInfo, FormEvent, Limit, MultipartConfig, MultipartDecoder, SinkRead,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// デフォルトの読み取りバッファサイズ
const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// デフォルトのチャネル容量
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// 利用者に届くイベント
#[derive(Debug)]
pub enum Event {
    /// フィールド
    Field(Field),
    /// ファイルパート
    File(FileField),
    /// 制限に達した
    LimitHit(Limit),
    /// すべてのパートが完了した
    Finished,
}

/// ファイルパート
#[derive(Debug)]
pub struct FileField {
    pub info: FileInfo,
    pub stream: FileStream,
}

#[derive(Debug)]
enum FileMessage {
    Data(Vec<u8>),
    /// max_file_size で切り詰められた
    Truncated,
    Error(Error),
}

/// ファイルパートのボディ
#[derive(Debug)]
pub struct FileStream {
    rx: mpsc::Receiver<FileMessage>,
    done: Option<oneshot::Sender<()>>,
    bytes_read: usize,
    truncated: bool,
}

impl FileStream {
    fn new(rx: mpsc::Receiver<FileMessage>, done: oneshot::Sender<()>) -> Self {
        FileStream {
            rx,
            done: Some(done),
            bytes_read: 0,
            truncated: false,
        }
    }

    /// 次の断片を読む
    ///
    /// 終端では `None` を返す。
    pub async fn chunk(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.rx.recv().await {
                Some(FileMessage::Data(data)) => {
                    self.bytes_read += data.len();
                    return Some(Ok(data));
                }
                Some(FileMessage::Truncated) => self.truncated = true,
                Some(FileMessage::Error(e)) => return Some(Err(e)),
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    /// 残りをすべて読む
    pub async fn bytes(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.chunk().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    /// これまでに読んだバイト数
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// max_file_size で切り詰められたか
    ///
    /// 終端まで読んだ後に確定する。
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.finish();
    }
}

/// イベントの受信側
#[derive(Debug)]
pub struct Events {
    rx: mpsc::Receiver<Result<Event>>,
}

impl Events {
    /// 次のイベントを受け取る
    ///
    /// 完了またはエラーの後は `None` を返す。
    pub async fn next(&mut self) -> Option<Result<Event>> {
        self.rx.recv().await
    }
}

/// multipart/form-data リーダー
pub struct Multipart<R> {
    reader: R,
    decoder: MultipartDecoder,
    read_buffer_size: usize,
    channel_capacity: usize,
}

impl<R: AsyncRead + Unpin> Multipart<R> {
    /// リーダーと設定を指定して作成
    pub fn new(reader: R, config: MultipartConfig) -> Result<Self> {
        Ok(Multipart {
            reader,
            decoder: MultipartDecoder::new(config)?,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        })
    }

    /// 1 回の読み取りサイズを設定
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// イベントとファイルのチャネル容量を設定
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Driver とイベント受信側に分ける
    ///
    /// Driver の [`run`](Driver::run) を spawn するか、イベント処理と `join!` で並行に動かす。
    pub fn into_parts(self) -> (Driver<R>, Events) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let driver = Driver {
            reader: self.reader,
            decoder: self.decoder,
            events: tx,
            files: Vec::new(),
            pending_done: Vec::new(),
            read_buffer_size: self.read_buffer_size,
            channel_capacity: self.channel_capacity,
            finished: false,
        };
        (driver, Events { rx })
    }
}

/// 転送中のファイル
struct OpenFile {
    id: FileId,
    tx: mpsc::Sender<FileMessage>,
    truncated: bool,
}

/// 入力を読み、デコード結果を転送する
pub struct Driver<R> {
    reader: R,
    decoder: MultipartDecoder,
    events: mpsc::Sender<Result<Event>>,
    files: Vec<OpenFile>,
    /// 利用者側の FileStream が終わったことの通知
    pending_done: Vec<oneshot::Receiver<()>>,
    read_buffer_size: usize,
    channel_capacity: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> Driver<R> {
    /// 入力の終わりまで処理する
    ///
    /// エラーは [`Events`] にも送られる。
    pub async fn run(mut self) -> Result<()> {
        match self.drive().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "multipart decode failed");
                let _ = self.events.send(Err(e.duplicate())).await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.read_buffer_size];
        loop {
            if !self.pump().await? {
                debug!("event receiver dropped");
                self.decoder.abort();
                return Ok(());
            }
            if self.finished {
                return Ok(());
            }

            let n = match self.reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.decoder.abort();
                    self.pump_files().await?;
                    return Err(e.into());
                }
            };
            if n == 0 {
                let ended = self.decoder.end();
                self.pump().await?;
                return ended.map_err(Error::from);
            }
            trace!(bytes = n, "read chunk");
            self.decoder.feed(&buf[..n])?;
        }
    }

    /// 積まれたイベントとファイルのデータを転送する
    ///
    /// イベント受信側が閉じていたら `false` を返す。
    async fn pump(&mut self) -> Result<bool> {
        loop {
            match self.decoder.poll_event() {
                Some(event) => {
                    if !self.dispatch(event).await {
                        return Ok(false);
                    }
                    self.pump_files().await?;
                }
                None => {
                    // ファイルを閉じると完了イベントが積まれることがある
                    if !self.pump_files().await? {
                        return Ok(true);
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, event: FormEvent) -> bool {
        match event {
            FormEvent::Field(field) => {
                debug!(name = %field.name, truncated = field.value_truncated, "field");
                self.send(Event::Field(field)).await
            }
            FormEvent::File(info) => {
                debug!(
                    file = %info.id,
                    name = %info.name,
                    filename = ?info.filename,
                    "file part opened"
                );
                let (tx, rx) = mpsc::channel(self.channel_capacity);
                let (done_tx, done_rx) = oneshot::channel();
                self.files.push(OpenFile {
                    id: info.id,
                    tx,
                    truncated: false,
                });
                self.pending_done.push(done_rx);
                let stream = FileStream::new(rx, done_tx);
                self.send(Event::File(FileField { info, stream })).await
            }
            FormEvent::LimitHit(limit) => {
                warn!(?limit, "limit reached");
                if let Limit::FileSize { id } = limit {
                    if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
                        file.truncated = true;
                    }
                }
                self.send(Event::LimitHit(limit)).await
            }
            FormEvent::Error(e) => {
                warn!(error = %e, "malformed multipart body");
                true
            }
            FormEvent::Finished => {
                for done in std::mem::take(&mut self.pending_done) {
                    let _ = done.await;
                }
                debug!("form finished");
                self.finished = true;
                self.send(Event::Finished).await
            }
        }
    }

    async fn send(&mut self, event: Event) -> bool {
        self.events.send(Ok(event)).await.is_ok()
    }

    /// 各ファイルのバッファを転送し、閉じたファイルがあれば `true` を返す
    async fn pump_files(&mut self) -> Result<bool> {
        let mut closed_any = false;
        let mut i = 0;
        while i < self.files.len() {
            if self.pump_file(i).await? {
                self.files.remove(i);
                closed_any = true;
            } else {
                i += 1;
            }
        }
        Ok(closed_any)
    }

    async fn pump_file(&mut self, index: usize) -> Result<bool> {
        let id = self.files[index].id;
        loop {
            let message = match self.decoder.read_file(id)? {
                SinkRead::Data(data) => {
                    trace!(file = %id, bytes = data.len(), "file chunk");
                    FileMessage::Data(data)
                }
                SinkRead::Pending => return Ok(false),
                SinkRead::End => {
                    debug!(file = %id, "file part closed");
                    if self.files[index].truncated {
                        self.forward(index, FileMessage::Truncated).await;
                    }
                    return Ok(true);
                }
                SinkRead::Error(e) => {
                    warn!(file = %id, error = %e, "file part terminated");
                    self.forward(index, FileMessage::Error(Error::Multipart(e)))
                        .await;
                    return Ok(true);
                }
            };
            if !self.forward(index, message).await {
                debug!(file = %id, "file stream dropped, discarding the rest");
                self.decoder.discard_file(id)?;
                return Ok(true);
            }
        }
    }

    async fn forward(&mut self, index: usize, message: FileMessage) -> bool {
        self.files[index].tx.send(message).await.is_ok()
    }
}
