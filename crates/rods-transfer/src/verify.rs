//! 内容校验：本地 SHA-256 对比远端副本校验和。

use crate::progress::{TransferAction, notify};
use crate::worker::TransferWorker;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::types::DataObject;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// 解码 `sha2:` 前缀后面的 base64 摘要。
pub(crate) fn decode_sha2_checksum(encoded: &str) -> Result<Vec<u8>, RodsError> {
    BASE64
        .decode(encoded)
        .map_err(|_| RodsError::Parse {
            value: encoded.to_string(),
            target: "base64 sha-256 digest",
        })
}

/// 解析服务端返回的校验和串；只认 `sha2:<base64>` 形式。
pub(crate) fn parse_remote_checksum(value: &str) -> Result<Vec<u8>, RodsError> {
    match value.strip_prefix("sha2:") {
        Some(rest) if !rest.is_empty() => decode_sha2_checksum(rest),
        _ => Err(RodsError::ChecksumNotFound),
    }
}

/// 在阻塞任务里计算本地文件的 SHA-256，并与取消信号赛跑。
///
/// 哈希循环在每个块之间轮询取消标志；外层 select 保证调用方在取消后
/// 立即返回，不再等待哈希收尾。
pub(crate) async fn local_sha256(ctx: &CallContext, path: &Path) -> Result<Vec<u8>, RodsError> {
    ctx.ensure_active()?;
    let cancellation = ctx.cancellation().child();
    let path = path.to_path_buf();
    let mut task = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, RodsError> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0_u8; 1 << 20];
        loop {
            if cancellation.is_cancelled() {
                return Err(RodsError::Cancelled);
            }
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finalize().to_vec())
    });
    tokio::select! {
        joined = &mut task => joined.map_err(|err| RodsError::Io(std::io::Error::other(err)))?,
        _ = ctx.cancellation().cancelled() => Err(RodsError::Cancelled),
    }
}

impl TransferWorker {
    /// 校验本地文件与远端数据对象的内容一致性。
    pub async fn verify(
        &self,
        ctx: &CallContext,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), RodsError> {
        let object = self.client().get_data_object(ctx, remote_path).await?;
        self.verify_object(ctx, local_path, &object).await
    }

    /// 以已获取的目录记录执行校验。
    ///
    /// 好副本携带 `sha2:` 校验和时直接使用缓存值，不再发校验和请求；
    /// 否则向服务端请求一次。不一致时返回
    /// [`RodsError::ChecksumMismatch`]，两侧摘要均以 base64 给出。
    pub async fn verify_object(
        &self,
        ctx: &CallContext,
        local_path: &Path,
        object: &DataObject,
    ) -> Result<(), RodsError> {
        notify(
            &self.options().progress_handler,
            &object.path,
            TransferAction::ComputeChecksum,
        );
        let local_digest = local_sha256(ctx, local_path).await?;
        let remote_digest = match object
            .current_replica()
            .and_then(|replica| replica.sha2_checksum())
        {
            Some(checksum) => decode_sha2_checksum(checksum.base64)?,
            None => {
                let checksum = self.client().checksum(ctx, &object.path).await?;
                parse_remote_checksum(&checksum)?
            }
        };
        if local_digest != remote_digest {
            return Err(RodsError::ChecksumMismatch {
                local: BASE64.encode(&local_digest),
                remote: BASE64.encode(&remote_digest),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_checksum_requires_sha2_prefix() {
        assert!(matches!(
            parse_remote_checksum("md5:abcd"),
            Err(RodsError::ChecksumNotFound)
        ));
        assert!(matches!(
            parse_remote_checksum(""),
            Err(RodsError::ChecksumNotFound)
        ));
        let digest = Sha256::digest(b"test");
        let encoded = BASE64.encode(digest);
        assert_eq!(
            parse_remote_checksum(&format!("sha2:{encoded}")).expect("合法校验和应可解析"),
            digest.to_vec()
        );
    }

    #[tokio::test]
    async fn local_sha256_matches_direct_hash() {
        let dir = tempfile::tempdir().expect("应能创建临时目录");
        let file_path = dir.path().join("hashed.bin");
        std::fs::write(&file_path, b"0123456789").expect("应能写入样本");
        let ctx = CallContext::background();
        let digest = local_sha256(&ctx, &file_path).await.expect("哈希应成功");
        assert_eq!(digest, Sha256::digest(b"0123456789").to_vec());
    }

    #[tokio::test]
    async fn local_sha256_respects_cancellation() {
        let dir = tempfile::tempdir().expect("应能创建临时目录");
        let file_path = dir.path().join("cancelled.bin");
        std::fs::write(&file_path, b"data").expect("应能写入样本");
        let ctx = CallContext::background();
        ctx.cancellation().cancel();
        assert!(matches!(
            local_sha256(&ctx, &file_path).await,
            Err(RodsError::Cancelled)
        ));
    }
}
