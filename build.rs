use std::path::PathBuf;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

/// 生成与迁移脚本一致的空数据库，供 `sqlx::query!` 在编译期检查语句
#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("cargo:rerun-if-changed=migrations");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let schema = out_dir.join("schema.db");
    let _ = std::fs::remove_file(&schema);

    let options = SqliteConnectOptions::new().filename(&schema).create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool.close().await;

    println!("cargo:rustc-env=DATABASE_URL=sqlite://{}", schema.display());
}
