//! 目录变更与管理操作：每个方法都是一次取连接、发请求、归还连接。

use crate::facade::Client;
use rods_core::api::{self, keywords};
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::message::{
    CollectionRequest, DataObjCopyRequest, DataObjectRequest, GeneralAdminRequest, KeyVals,
    ModAccessRequest, ModAvuRequest, ModDataObjMetaRequest, RequestBody, opr,
};
use rods_core::path;
use rods_core::types::{AccessLevel, Metadata, ObjectType, unix_seconds};
use std::time::SystemTime;

/// 原子元数据批量应用的单个操作。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomicMetadataOp {
    /// `add` 或 `remove`。
    pub operation: String,
    pub metadata: Metadata,
}

impl AtomicMetadataOp {
    /// 追加元数据的操作。
    pub fn add(metadata: Metadata) -> Self {
        Self {
            operation: "add".to_string(),
            metadata,
        }
    }

    /// 移除元数据的操作。
    pub fn remove(metadata: Metadata) -> Self {
        Self {
            operation: "remove".to_string(),
            metadata,
        }
    }
}

impl Client {
    fn base_options(&self) -> KeyVals {
        let mut options = KeyVals::new();
        self.apply_admin(&mut options);
        options
    }

    /// 创建集合。
    pub async fn create_collection(
        &self,
        ctx: &CallContext,
        coll_path: &str,
    ) -> Result<(), RodsError> {
        let request = CollectionRequest {
            path: path::clean(coll_path),
            options: self.base_options(),
        };
        self.exec(ctx, api::COLL_CREATE, RequestBody::Collection(request))
            .await?
            .into_empty(api::COLL_CREATE)
    }

    /// 逐级创建集合（`mkdir -p` 语义）。
    pub async fn create_collection_all(
        &self,
        ctx: &CallContext,
        coll_path: &str,
    ) -> Result<(), RodsError> {
        let mut options = self.base_options();
        options.set(keywords::RECURSIVE_OPR_KW, "");
        let request = CollectionRequest {
            path: path::clean(coll_path),
            options,
        };
        self.exec(ctx, api::COLL_CREATE, RequestBody::Collection(request))
            .await?
            .into_empty(api::COLL_CREATE)
    }

    /// 删除集合。
    pub async fn delete_collection(
        &self,
        ctx: &CallContext,
        coll_path: &str,
        recursive: bool,
        force: bool,
    ) -> Result<(), RodsError> {
        let mut options = self.base_options();
        if recursive {
            options.set(keywords::RECURSIVE_OPR_KW, "");
        }
        if force {
            options.set(keywords::FORCE_FLAG_KW, "");
        }
        let coll_path = path::clean(coll_path);
        let request = CollectionRequest {
            path: coll_path.clone(),
            options,
        };
        self.exec_elevated(
            ctx,
            api::RM_COLL,
            RequestBody::Collection(request),
            &coll_path,
        )
        .await?
        .into_empty(api::RM_COLL)
    }

    /// 重命名集合。
    pub async fn rename_collection(
        &self,
        ctx: &CallContext,
        src_path: &str,
        dst_path: &str,
    ) -> Result<(), RodsError> {
        let src_path = path::clean(src_path);
        let mut src = DataObjectRequest::with_path(src_path.clone());
        src.opr_type = opr::RENAME_COLL;
        let mut dst = DataObjectRequest::with_path(path::clean(dst_path));
        dst.opr_type = opr::RENAME_COLL;
        let request = DataObjCopyRequest { src, dst };
        self.exec_elevated(
            ctx,
            api::DATA_OBJ_RENAME,
            RequestBody::DataObjCopy(request),
            &src_path,
        )
        .await?
        .into_empty(api::DATA_OBJ_RENAME)
    }

    /// 删除数据对象。
    pub async fn delete_data_object(
        &self,
        ctx: &CallContext,
        obj_path: &str,
        force: bool,
    ) -> Result<(), RodsError> {
        let obj_path = path::clean(obj_path);
        let mut request = DataObjectRequest::with_path(obj_path.clone());
        request.options = self.base_options();
        if force {
            request.options.set(keywords::FORCE_FLAG_KW, "");
        }
        self.exec_elevated(
            ctx,
            api::DATA_OBJ_UNLINK,
            RequestBody::DataObj(request),
            &obj_path,
        )
        .await?
        .into_empty(api::DATA_OBJ_UNLINK)
    }

    /// 重命名数据对象。
    pub async fn rename_data_object(
        &self,
        ctx: &CallContext,
        src_path: &str,
        dst_path: &str,
    ) -> Result<(), RodsError> {
        let src_path = path::clean(src_path);
        let mut src = DataObjectRequest::with_path(src_path.clone());
        src.opr_type = opr::RENAME_DATA_OBJ;
        let mut dst = DataObjectRequest::with_path(path::clean(dst_path));
        dst.opr_type = opr::RENAME_DATA_OBJ;
        let request = DataObjCopyRequest { src, dst };
        self.exec_elevated(
            ctx,
            api::DATA_OBJ_RENAME,
            RequestBody::DataObjCopy(request),
            &src_path,
        )
        .await?
        .into_empty(api::DATA_OBJ_RENAME)
    }

    /// 服务端拷贝数据对象。
    pub async fn copy_data_object(
        &self,
        ctx: &CallContext,
        src_path: &str,
        dst_path: &str,
    ) -> Result<(), RodsError> {
        let src_path = path::clean(src_path);
        let mut src = DataObjectRequest::with_path(src_path.clone());
        src.opr_type = opr::COPY_SRC;
        let mut dst = DataObjectRequest::with_path(path::clean(dst_path));
        dst.opr_type = opr::COPY_DEST;
        if let Some(resource) = self.default_resource() {
            dst.options.set(keywords::DEST_RESC_NAME_KW, resource);
        }
        let request = DataObjCopyRequest { src, dst };
        self.exec_elevated(
            ctx,
            api::DATA_OBJ_COPY,
            RequestBody::DataObjCopy(request),
            &src_path,
        )
        .await?
        .into_empty(api::DATA_OBJ_COPY)
    }

    /// 路径级 touch；`time` 为空表示取服务端当前时刻。
    pub async fn touch(
        &self,
        ctx: &CallContext,
        target_path: &str,
        time: Option<SystemTime>,
        no_create: bool,
    ) -> Result<(), RodsError> {
        let mut options = serde_json::json!({ "no_create": no_create });
        if let Some(time) = time {
            options["seconds_since_epoch"] = serde_json::json!(unix_seconds(time));
        }
        if let Some(replica_number) = self.replica_number() {
            options["replica_number"] = serde_json::json!(replica_number);
        }
        let body = serde_json::json!({
            "logical_path": path::clean(target_path),
            "options": options,
        });
        self.exec(ctx, api::TOUCH, RequestBody::Json(body))
            .await?
            .into_empty(api::TOUCH)
    }

    /// 请求服务端计算（或返回已缓存的）校验和。
    pub async fn checksum(&self, ctx: &CallContext, obj_path: &str) -> Result<String, RodsError> {
        let mut request = DataObjectRequest::with_path(path::clean(obj_path));
        request.options = self.base_options();
        let reply = self
            .exec(ctx, api::DATA_OBJ_CHKSUM, RequestBody::DataObj(request))
            .await?;
        reply.into_checksum(api::DATA_OBJ_CHKSUM)
    }

    /// 设置集合的继承标志。
    pub async fn set_inheritance(
        &self,
        ctx: &CallContext,
        coll_path: &str,
        inherit: bool,
        recursive: bool,
    ) -> Result<(), RodsError> {
        let request = ModAccessRequest {
            recursive,
            access_level: if inherit { "inherit" } else { "noinherit" }.to_string(),
            user_name: String::new(),
            zone: String::new(),
            path: path::clean(coll_path),
        };
        self.exec(ctx, api::MOD_ACCESS_CONTROL, RequestBody::ModAccess(request))
            .await?
            .into_empty(api::MOD_ACCESS_CONTROL)
    }

    /// 修改访问控制；管理员模式以 `admin:` 级别前缀表达。
    pub async fn modify_access(
        &self,
        ctx: &CallContext,
        target_path: &str,
        user_spec: &str,
        level: AccessLevel,
        recursive: bool,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let access_level = if self.is_admin() {
            format!("admin:{}", level.as_str())
        } else {
            level.as_str().to_string()
        };
        let request = ModAccessRequest {
            recursive,
            access_level,
            user_name: spec.name,
            zone: spec.zone,
            path: path::clean(target_path),
        };
        self.exec(ctx, api::MOD_ACCESS_CONTROL, RequestBody::ModAccess(request))
            .await?
            .into_empty(api::MOD_ACCESS_CONTROL)
    }

    async fn mod_avu(
        &self,
        ctx: &CallContext,
        operation: &str,
        object_type: ObjectType,
        target: &str,
        metadata: Metadata,
    ) -> Result<(), RodsError> {
        let target = match object_type {
            ObjectType::Collection | ObjectType::DataObject => path::clean(target),
            ObjectType::Resource | ObjectType::User => target.to_string(),
        };
        let request = ModAvuRequest {
            operation: operation.to_string(),
            item_type: object_type.item_flag().to_string(),
            path: target,
            name: metadata.name,
            value: metadata.value,
            units: metadata.units,
        };
        self.exec(ctx, api::MOD_AVU_METADATA, RequestBody::ModAvu(request))
            .await?
            .into_empty(api::MOD_AVU_METADATA)
    }

    /// 追加元数据三元组。
    pub async fn add_metadata(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
        metadata: Metadata,
    ) -> Result<(), RodsError> {
        self.mod_avu(ctx, "add", object_type, target, metadata).await
    }

    /// 移除元数据三元组。
    pub async fn remove_metadata(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
        metadata: Metadata,
    ) -> Result<(), RodsError> {
        self.mod_avu(ctx, "rm", object_type, target, metadata).await
    }

    /// 以覆盖语义设置元数据。
    pub async fn set_metadata(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
        metadata: Metadata,
    ) -> Result<(), RodsError> {
        self.mod_avu(ctx, "set", object_type, target, metadata).await
    }

    /// 原子批量应用元数据操作。
    pub async fn atomic_metadata(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
        operations: &[AtomicMetadataOp],
    ) -> Result<(), RodsError> {
        let entity_type = match object_type {
            ObjectType::User => "user",
            ObjectType::Collection => "collection",
            ObjectType::DataObject => "data_object",
            ObjectType::Resource => "resource",
        };
        let operations: Vec<serde_json::Value> = operations
            .iter()
            .map(|op| {
                serde_json::json!({
                    "operation": op.operation,
                    "attribute": op.metadata.name,
                    "value": op.metadata.value,
                    "units": op.metadata.units,
                })
            })
            .collect();
        let body = serde_json::json!({
            "admin_mode": self.is_admin(),
            "entity_name": target,
            "entity_type": entity_type,
            "operations": operations,
        });
        self.exec(ctx, api::ATOMIC_APPLY_METADATA, RequestBody::AtomicMetadata(body))
            .await?
            .into_empty(api::ATOMIC_APPLY_METADATA)
    }

    async fn general_admin<I, S>(&self, ctx: &CallContext, args: I) -> Result<(), RodsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_admin()?;
        let request = GeneralAdminRequest::with_args(args);
        self.exec(ctx, api::GENERAL_ADMIN, RequestBody::GeneralAdmin(request))
            .await?
            .into_empty(api::GENERAL_ADMIN)
    }

    /// 创建用户或用户组。
    pub async fn create_user(
        &self,
        ctx: &CallContext,
        user_spec: &str,
        user_type: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let qualified = spec.qualified();
        self.general_admin(ctx, ["add", "user", qualified.as_str(), user_type, "", ""])
            .await
    }

    /// 删除用户或用户组。
    pub async fn remove_user(&self, ctx: &CallContext, user_spec: &str) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        self.general_admin(ctx, ["rm", "user", spec.name.as_str(), spec.zone.as_str()])
            .await
    }

    /// 修改用户口令。
    ///
    /// 口令混淆属于认证握手层，由连接实现方在编组时完成。
    pub async fn set_user_password(
        &self,
        ctx: &CallContext,
        user_spec: &str,
        password: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let qualified = spec.qualified();
        self.general_admin(
            ctx,
            ["modify", "user", qualified.as_str(), "password", password],
        )
        .await
    }

    /// 修改用户类型。
    pub async fn set_user_type(
        &self,
        ctx: &CallContext,
        user_spec: &str,
        user_type: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let qualified = spec.qualified();
        self.general_admin(ctx, ["modify", "user", qualified.as_str(), "type", user_type])
            .await
    }

    /// 把用户加入用户组。
    pub async fn add_group_member(
        &self,
        ctx: &CallContext,
        group: &str,
        user_spec: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        self.general_admin(
            ctx,
            [
                "modify",
                "group",
                group,
                "add",
                spec.name.as_str(),
                spec.zone.as_str(),
            ],
        )
        .await
    }

    /// 把用户移出用户组。
    pub async fn remove_group_member(
        &self,
        ctx: &CallContext,
        group: &str,
        user_spec: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        self.general_admin(
            ctx,
            [
                "modify",
                "group",
                group,
                "remove",
                spec.name.as_str(),
                spec.zone.as_str(),
            ],
        )
        .await
    }

    /// 设置用户在某资源上的配额；资源为空表示全局配额。
    pub async fn set_user_quota(
        &self,
        ctx: &CallContext,
        user_spec: &str,
        resource: Option<&str>,
        quota: &str,
    ) -> Result<(), RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let qualified = spec.qualified();
        self.general_admin(
            ctx,
            [
                "set-quota",
                "user",
                qualified.as_str(),
                resource.unwrap_or("total"),
                quota,
            ],
        )
        .await
    }

    /// 修改副本的目录属性（管理员操作）。
    pub async fn modify_replica_attribute(
        &self,
        ctx: &CallContext,
        obj_path: &str,
        replica_number: i32,
        attribute: &str,
        value: &str,
    ) -> Result<(), RodsError> {
        self.require_admin()?;
        let mut attributes = KeyVals::new();
        attributes.set(attribute, value);
        attributes.set(keywords::ADMIN_KW, "");
        let request = ModDataObjMetaRequest {
            path: path::clean(obj_path),
            replica_number: Some(replica_number),
            attributes,
        };
        self.exec(ctx, api::MOD_DATA_OBJ_META, RequestBody::ModDataObjMeta(request))
            .await?
            .into_empty(api::MOD_DATA_OBJ_META)
    }

    /// 把物理文件注册为数据对象（或额外副本）。
    pub async fn register_replica(
        &self,
        ctx: &CallContext,
        obj_path: &str,
        physical_path: &str,
        as_additional_replica: bool,
    ) -> Result<(), RodsError> {
        self.require_admin()?;
        let mut request = DataObjectRequest::with_path(path::clean(obj_path));
        request.options = self.base_options();
        request.options.set(keywords::FILE_PATH_KW, physical_path);
        if as_additional_replica {
            request.options.set(keywords::REG_REPL_KW, "");
        }
        if let Some(resource) = self.default_resource() {
            request.options.set(keywords::DEST_RESC_NAME_KW, resource);
        }
        self.exec(ctx, api::PHY_PATH_REG, RequestBody::DataObj(request))
            .await?
            .into_empty(api::PHY_PATH_REG)
    }

    /// 执行外部规则文本。
    pub async fn exec_rule(
        &self,
        ctx: &CallContext,
        rule_text: &str,
        params: KeyVals,
        out_param_desc: &str,
    ) -> Result<serde_json::Value, RodsError> {
        self.require_admin()?;
        let request = rods_core::message::ExecRuleRequest {
            rule_text: rule_text.to_string(),
            params,
            out_param_desc: out_param_desc.to_string(),
        };
        let reply = self
            .exec(ctx, api::EXEC_MY_RULE, RequestBody::ExecRule(request))
            .await?;
        match reply {
            rods_core::message::ReplyBody::Empty => Ok(serde_json::Value::Null),
            other => other.into_json(api::EXEC_MY_RULE),
        }
    }

    /// 查询服务端连接进程状态。
    pub async fn proc_stat(
        &self,
        ctx: &CallContext,
    ) -> Result<rods_core::message::GenQueryReply, RodsError> {
        self.require_admin()?;
        let reply = self
            .exec(ctx, api::PROC_STAT, RequestBody::Empty)
            .await?;
        reply.into_gen_query(api::PROC_STAT)
    }
}
