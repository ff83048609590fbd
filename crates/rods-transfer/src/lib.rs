#![doc = r#"
# rods-transfer

## 设计动机（Why）
- **定位**：在 `rods-client` 的句柄与范围适配器之上实现并行传输引擎：
  单文件多连接范围拷贝、目录级同步（上传/下载/拷贝/删除）与内容校验。
- **架构角色**：引擎自身不碰连接协议，只消费门面、句柄与范围区段；
  因此调度逻辑可以用脚本化连接完整地离线测试。
- **设计理念**：范围切分保证 `r*threads ≥ size`、`r % buffer == 0` 且
  `r ≥ minimum`；目录同步用三个协作任务（本地漫游、远端扫描、传输
  分发）和两条有界队列组织，任何一侧关停都能把队列排空而不悬挂。

## 核心契约（What）
- 进度事件是 fire-and-forget 通知，处理器必须线程安全；
- 错误先路由给错误处理器决定续行或终止，再并入聚合错误返回；
- 取消在每次入队与每个拷贝循环步进处生效。
"#]

pub mod options;
pub mod progress;
pub mod sizing;
pub mod sync;
pub mod verify;
pub mod worker;

pub use options::{ErrorDisposition, ErrorHandler, ProgressHandler, TransferOptions};
pub use progress::{ProgressEvent, TransferAction};
pub use sizing::{BUFFER_SIZE, MINIMUM_RANGE_SIZE, calculate_range_size};
pub use worker::TransferWorker;
