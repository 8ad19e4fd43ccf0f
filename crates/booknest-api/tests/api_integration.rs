use std::sync::Arc;

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use booknest_api::{create_router, seed_defaults, AppState, ImageHost, ImageUpload, MediaError, PosterPage};
use booknest_core::config::Settings;
use booknest_core::slug::slugify;
use booknest_core::{Novel, NovelDraft, NovelStatus, Role, Store};
use booknest_store::MemoryStore;
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingHost {
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageHost for RecordingHost {
    async fn upload(&self, upload: ImageUpload) -> Result<Value, MediaError> {
        self.uploads.lock().push(upload.file_name.clone());
        Ok(json!({
            "public_id": format!("posters/{}", upload.file_name),
            "secure_url": format!("https://img.example.test/{}", upload.file_name),
            "bytes": upload.bytes.len(),
        }))
    }

    async fn list_posters(&self, next_cursor: Option<&str>) -> Result<PosterPage, MediaError> {
        Ok(PosterPage {
            resources: vec!["https://img.example.test/a.jpg".to_string()],
            next_cursor: next_cursor.map(|c| format!("{}-next", c)),
        })
    }
}

struct Harness {
    server: TestServer,
    store: Arc<MemoryStore>,
    host: Arc<RecordingHost>,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    seed_defaults(store.as_ref()).await.expect("seed");
    let host = Arc::new(RecordingHost::default());
    let state = AppState::with_parts(store.clone(), host.clone(), Settings::default());
    let server = TestServer::new(create_router(state)).unwrap();
    Harness { server, store, host }
}

impl Harness {
    async fn register(&self, username: &str) -> String {
        let resp = self
            .server
            .post("/auth/register")
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "secret-pass"
            }))
            .await;
        assert_eq!(resp.status_code(), 201, "{}", resp.text());
        let body: Value = resp.json();
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Registers, promotes through the store, then logs in again for a token carrying the role.
    async fn admin(&self, username: &str) -> String {
        self.register(username).await;
        let mut user = self.store.user_by_username(username).await.unwrap().unwrap();
        user.role = Role::Admin;
        self.store.update_user(&user).await.unwrap();

        let resp = self
            .server
            .post("/auth/login")
            .json(&json!({ "username": username, "password": "secret-pass" }))
            .await;
        assert_eq!(resp.status_code(), 200);
        let body: Value = resp.json();
        assert_eq!(body["user"]["role"], "admin");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn fallback_category(&self) -> String {
        let body: Value = self.server.get("/categories").await.json();
        body.as_array()
            .unwrap()
            .iter()
            .find(|c| c["slug"] == "khac")
            .map(|c| c["_id"].as_str().unwrap().to_string())
            .unwrap()
    }

    async fn create_novel(&self, token: &str, title: &str, category: &str) -> Value {
        let resp = self
            .server
            .post("/novels")
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "author": "Kim Dung",
                "category": category,
                "tags": ["Kiếm Hiệp", "kiem hiep"]
            }))
            .await;
        assert_eq!(resp.status_code(), 201, "{}", resp.text());
        resp.json()
    }
}

#[tokio::test]
async fn health_reports_backend() {
    let h = harness().await;
    let resp = h.server.get("/health").await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn register_login_and_profile() {
    let h = harness().await;
    let token = h.register("reader01").await;

    let dup = h
        .server
        .post("/auth/signup")
        .json(&json!({
            "username": "reader01",
            "email": "other@example.com",
            "password": "secret-pass"
        }))
        .await;
    assert_eq!(dup.status_code(), 409);

    let bad = h
        .server
        .post("/auth/login")
        .json(&json!({ "username": "reader01", "password": "wrong-pass" }))
        .await;
    assert_eq!(bad.status_code(), 401);

    let me = h.server.get("/auth/me").authorization_bearer(&token).await;
    assert_eq!(me.status_code(), 200);
    let body: Value = me.json();
    assert_eq!(body["username"], "reader01");
    assert_eq!(body["goldcard"], 20);
    assert!(body.get("password").is_none());

    assert_eq!(h.server.get("/auth/me").await.status_code(), 401);
    assert_eq!(
        h.server
            .get("/auth/me")
            .authorization_bearer("not-a-token")
            .await
            .status_code(),
        401
    );
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let h = harness().await;
    let resp = h
        .server
        .post("/auth/login")
        .text("{\"username\":")
        .content_type("application/json")
        .await;
    assert_eq!(resp.status_code(), 400);
    let body: Value = resp.json();
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn novels_from_users_wait_for_approval() {
    let h = harness().await;
    let user = h.register("writer01").await;
    let admin = h.admin("admin001").await;
    let category = h.fallback_category().await;

    let novel = h.create_novel(&user, "Thiên Long Bát Bộ", &category).await;
    assert_eq!(novel["approved"], false);
    assert_eq!(novel["slug"], "thien-long-bat-bo");
    assert_eq!(novel["tags"].as_array().unwrap().len(), 1);
    let id = novel["_id"].as_str().unwrap().to_string();

    assert_eq!(h.server.get("/novels/thien-long-bat-bo").await.status_code(), 404);
    let own = h
        .server
        .get("/novels/thien-long-bat-bo")
        .authorization_bearer(&user)
        .await;
    assert_eq!(own.status_code(), 200);

    let pending = h
        .server
        .get("/novels/admin/pending")
        .authorization_bearer(&user)
        .await;
    assert_eq!(pending.status_code(), 403);

    let approve = h
        .server
        .patch(&format!("/novels/admin/approve/{}", id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(approve.status_code(), 200);
    assert_eq!(h.server.get("/novels/thien-long-bat-bo").await.status_code(), 200);

    let by_admin = h.create_novel(&admin, "Lộc Đỉnh Ký", &category).await;
    assert_eq!(by_admin["approved"], true);

    let stats = h.server.get("/admin/stats").authorization_bearer(&admin).await;
    assert_eq!(stats.status_code(), 200);
    let stats: Value = stats.json();
    assert_eq!(stats["userCount"], 2);
    assert_eq!(stats["novelCount"], 2);
    assert_eq!(stats["pendingCount"], 0);
}

#[tokio::test]
async fn listings_and_chapters() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let category = h.fallback_category().await;
    let novel = h.create_novel(&admin, "Anh Hùng Xạ Điêu", &category).await;
    let id = novel["_id"].as_str().unwrap().to_string();

    for n in 1..=3 {
        let resp = h
            .server
            .post("/novels/newchap")
            .authorization_bearer(&admin)
            .json(&json!({
                "novel": id,
                "title": format!("Hồi {}", n),
                "content": "Nội dung chương"
            }))
            .await;
        assert_eq!(resp.status_code(), 201);
        let chap: Value = resp.json();
        assert_eq!(chap["chap"], n);
    }

    let chaps: Value = h.server.get(&format!("/novels/chaps/{}", id)).await.json();
    assert_eq!(chaps["total"], 3);
    assert_eq!(chaps["chaps"].as_array().unwrap().len(), 3);

    let read = h.server.get("/novels/chap/anh-hung-xa-dieu/2").await;
    assert_eq!(read.status_code(), 200);
    let read: Value = read.json();
    assert_eq!(read["title"], "Hồi 2");
    assert_eq!(read["chapCount"], 3);
    assert_eq!(h.server.get("/novels/chap/anh-hung-xa-dieu/9").await.status_code(), 404);

    let detail: Value = h.server.get(&format!("/novels/{}", id)).await.json();
    assert_eq!(detail["views"], 1);

    let newest: Value = h.server.get("/novels/newest").await.json();
    assert_eq!(newest.as_array().unwrap().len(), 1);

    let page: Value = h
        .server
        .get("/novels/turn/hasnewchap")
        .add_query_param("page", "undefined")
        .add_query_param("srt", "undefined")
        .await
        .json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);

    let unknown = h.server.get("/novels/turn/sideways").await;
    assert_eq!(unknown.status_code(), 400);

    let found: Value = h.server.get("/novels/search/xa%20dieu").await.json();
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn follows_ratings_and_votes() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let reader = h.register("reader01").await;
    let category = h.fallback_category().await;
    let novel = h.create_novel(&admin, "Tiếu Ngạo Giang Hồ", &category).await;
    let id = novel["_id"].as_str().unwrap().to_string();

    let follow = h
        .server
        .post("/follows")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id }))
        .await;
    assert_eq!(follow.status_code(), 200);
    let check: Value = h
        .server
        .get(&format!("/follows/check/{}", id))
        .authorization_bearer(&reader)
        .await
        .json();
    assert_eq!(check["followed"], true);

    h.server
        .post("/novels/newchap")
        .authorization_bearer(&admin)
        .json(&json!({ "novel": id, "title": "Hồi 1", "content": "..." }))
        .await;
    let feed: Value = h
        .server
        .get("/auth/notifications")
        .authorization_bearer(&reader)
        .await
        .json();
    assert_eq!(feed["count"], 1);

    let rate = h
        .server
        .post("/ratings")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "scores": 4, "content": "Hay" }))
        .await;
    assert_eq!(rate.status_code(), 200);
    let rate: Value = rate.json();
    assert_eq!(rate["rate_nums"], 1);
    assert_eq!(rate["scores"], 4.0);

    let again = h
        .server
        .post("/ratings")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "scores": 2 }))
        .await;
    assert_eq!(again.status_code(), 400);

    let vote = h
        .server
        .post("/auth/vote")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "goldcard": 15 }))
        .await;
    assert_eq!(vote.status_code(), 201);
    let vote: Value = vote.json();
    assert_eq!(vote["remaining"], 5);

    let broke = h
        .server
        .post("/auth/vote")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "goldcard": 6 }))
        .await;
    assert_eq!(broke.status_code(), 400);
    let broke: Value = broke.json();
    assert_eq!(broke["error"], "Không đủ kim phiếu");

    let unfollow = h
        .server
        .delete(&format!("/follows/{}", id))
        .authorization_bearer(&reader)
        .await;
    assert_eq!(unfollow.status_code(), 200);
}

#[tokio::test]
async fn comments_follow_site_settings() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let reader = h.register("reader01").await;
    let category = h.fallback_category().await;
    let novel = h.create_novel(&admin, "Cô Gái Đồ Long", &category).await;
    let id = novel["_id"].as_str().unwrap().to_string();

    let posted = h
        .server
        .post("/comments")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "content": "Truyện hay" }))
        .await;
    assert_eq!(posted.status_code(), 201);
    let posted: Value = posted.json();
    assert_eq!(posted["approved"], true);

    let forbidden = h
        .server
        .post("/settings")
        .authorization_bearer(&reader)
        .json(&json!({ "commentEnabled": false }))
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let updated = h
        .server
        .post("/settings")
        .authorization_bearer(&admin)
        .json(&json!({ "commentEnabled": false }))
        .await;
    assert_eq!(updated.status_code(), 200);
    let settings: Value = h.server.get("/settings").await.json();
    assert_eq!(settings["commentEnabled"], false);

    let blocked = h
        .server
        .post("/comments")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "content": "Lại hay" }))
        .await;
    assert_eq!(blocked.status_code(), 403);

    let listed: Value = h.server.get(&format!("/comments/novel/{}", id)).await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn messages_notify_receivers() {
    let h = harness().await;
    let sender = h.register("sender01").await;
    let receiver = h.register("receiver1").await;
    let receiver_id = h
        .store
        .user_by_username("receiver1")
        .await
        .unwrap()
        .unwrap()
        .id;

    let sent = h
        .server
        .post("/mess/sendmess")
        .authorization_bearer(&sender)
        .json(&json!({
            "title": "Chào",
            "content": "Xin chào bạn",
            "recieverList": [{ "_id": receiver_id }, receiver_id]
        }))
        .await;
    assert_eq!(sent.status_code(), 201);
    let sent: Value = sent.json();
    assert_eq!(sent["reciever"].as_array().unwrap().len(), 1);

    let inbox: Value = h
        .server
        .get("/mess/myrecieved")
        .authorization_bearer(&receiver)
        .await
        .json();
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let feed: Value = h
        .server
        .get("/auth/notifications")
        .authorization_bearer(&receiver)
        .await
        .json();
    assert_eq!(feed["count"], 1);

    let read: Value = h
        .server
        .post("/auth/readnotis")
        .authorization_bearer(&receiver)
        .await
        .json();
    assert_eq!(read["updated"], 1);

    let unknown = h
        .server
        .post("/mess/sendmess")
        .authorization_bearer(&sender)
        .json(&json!({ "title": "A", "content": "B", "recieverList": ["missing"] }))
        .await;
    assert_eq!(unknown.status_code(), 400);
}

#[tokio::test]
async fn category_delete_needs_an_option_when_in_use() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let fallback = h.fallback_category().await;

    let created = h
        .server
        .post("/categories")
        .authorization_bearer(&admin)
        .json(&json!({ "cate": "Tiên Hiệp" }))
        .await;
    assert_eq!(created.status_code(), 201);
    let created: Value = created.json();
    let cate_id = created["_id"].as_str().unwrap().to_string();
    let novel = h.create_novel(&admin, "Tru Tiên", &cate_id).await;

    let ask: Value = h
        .server
        .delete(&format!("/categories/{}", cate_id))
        .authorization_bearer(&admin)
        .await
        .json();
    assert_eq!(ask["requireOption"], true);
    assert_eq!(ask["novelCount"], 1);

    let done = h
        .server
        .delete(&format!("/categories/{}", cate_id))
        .add_query_param("option", "reassign")
        .authorization_bearer(&admin)
        .await;
    assert_eq!(done.status_code(), 200);

    let moved: Value = h.server.get("/novels/tru-tien").await.json();
    assert_eq!(moved["category"]["_id"], fallback);
    assert_eq!(moved["_id"], novel["_id"]);

    let protected = h
        .server
        .delete(&format!("/categories/{}", fallback))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(protected.status_code(), 403);
}

#[tokio::test]
async fn tags_reject_duplicate_names() {
    let h = harness().await;
    let admin = h.admin("admin001").await;

    let created = h
        .server
        .post("/tags")
        .authorization_bearer(&admin)
        .json(&json!({ "name": "Huyền Huyễn" }))
        .await;
    assert_eq!(created.status_code(), 201);
    let created: Value = created.json();
    assert_eq!(created["slug"], "huyen-huyen");

    let dup = h
        .server
        .post("/tags")
        .authorization_bearer(&admin)
        .json(&json!({ "name": "huyen huyen" }))
        .await;
    assert_eq!(dup.status_code(), 409);

    let by_slug = h.server.get("/tags/huyen-huyen").await;
    assert_eq!(by_slug.status_code(), 200);
}

#[tokio::test]
async fn uploads_go_to_the_image_host() {
    let h = harness().await;
    let token = h.register("uploader1").await;

    let anonymous = h
        .server
        .post("/file/upload")
        .multipart(MultipartForm::new().add_part("file", Part::bytes(vec![1u8, 2, 3]).file_name("a.png")))
        .await;
    assert_eq!(anonymous.status_code(), 401);

    let no_file = h
        .server
        .post("/file/upload")
        .authorization_bearer(&token)
        .multipart(MultipartForm::new().add_text("caption", "none"))
        .await;
    assert_eq!(no_file.status_code(), 400);

    let uploaded = h
        .server
        .post("/file/upload")
        .authorization_bearer(&token)
        .multipart(
            MultipartForm::new().add_part(
                "file",
                Part::bytes(vec![0x89u8, b'P', b'N', b'G'])
                    .file_name("cover.png")
                    .mime_type("image/png"),
            ),
        )
        .await;
    assert_eq!(uploaded.status_code(), 200);
    let body: Value = uploaded.json();
    assert_eq!(body["secure_url"], "https://img.example.test/cover.png");
    assert_eq!(h.host.uploads.lock().as_slice(), ["cover.png".to_string()]);

    let posters: Value = h
        .server
        .get("/file/posters")
        .add_query_param("next_cursor", "abc")
        .await
        .json();
    assert_eq!(posters["resources"].as_array().unwrap().len(), 1);
    assert_eq!(posters["next_cursor"], "abc-next");
}

#[tokio::test]
async fn huge_page_numbers_return_empty_pages() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let category = h.fallback_category().await;
    let novel = h.create_novel(&admin, "Bích Huyết Kiếm", &category).await;
    let id = novel["_id"].as_str().unwrap().to_string();
    h.server
        .post("/novels/newchap")
        .authorization_bearer(&admin)
        .json(&json!({ "novel": id, "title": "Hồi 1", "content": "..." }))
        .await;

    let huge = u64::MAX.to_string();
    let listing = h
        .server
        .get("/novels/turn/newest")
        .add_query_param("page", &huge)
        .await;
    assert_eq!(listing.status_code(), 200);
    let listing: Value = listing.json();
    assert_eq!(listing["total"], 1);
    assert!(listing["novels"].as_array().unwrap().is_empty());

    let chaps = h
        .server
        .get(&format!("/novels/chaps/{}", id))
        .add_query_param("page", &huge)
        .await;
    assert_eq!(chaps.status_code(), 200);
    let chaps: Value = chaps.json();
    assert_eq!(chaps["total"], 1);
    assert!(chaps["chaps"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn own_novel_list_is_not_truncated() {
    let h = harness().await;
    let token = h.register("uploader1").await;
    let other = h.register("uploader2").await;
    let me = h.store.user_by_username("uploader1").await.unwrap().unwrap();
    let category = h.fallback_category().await;
    for i in 0..105 {
        let title = format!("Truyện số {}", i);
        let novel = Novel::from_draft(NovelDraft {
            title: title.clone(),
            slug: slugify(&title),
            description: None,
            image: None,
            author: "author-1".into(),
            category: category.clone(),
            poster: me.id.clone(),
            tags: vec![],
            status: NovelStatus::Continue,
            approved: i % 10 != 0,
        })
        .unwrap();
        h.store.insert_novel(novel).await.unwrap();
    }
    h.create_novel(&other, "Tiếu Ngạo Giang Hồ", &category).await;

    let resp = h.server.get("/novels/all").authorization_bearer(&token).await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    let novels = body.as_array().unwrap();
    assert_eq!(novels.len(), 105);
    assert!(novels.iter().all(|n| n["poster"] == me.id.as_str()));
    assert_eq!(novels.iter().filter(|n| n["approved"] == false).count(), 11);
}

#[tokio::test]
async fn demoted_admin_token_no_longer_auto_approves() {
    let h = harness().await;
    let token = h.admin("mod01").await;
    let category = h.fallback_category().await;
    let approved = h.create_novel(&token, "Thiên Long Bát Bộ", &category).await;
    assert_eq!(approved["approved"], true);

    let mut user = h.store.user_by_username("mod01").await.unwrap().unwrap();
    user.role = Role::User;
    h.store.update_user(&user).await.unwrap();

    let pending = h.create_novel(&token, "Lộc Đỉnh Ký", &category).await;
    assert_eq!(pending["approved"], false);
}

#[tokio::test]
async fn admin_comment_delete_takes_replies() {
    let h = harness().await;
    let admin = h.admin("admin001").await;
    let reader = h.register("reader01").await;
    let category = h.fallback_category().await;
    let novel = h.create_novel(&admin, "Hiệp Khách Hành", &category).await;
    let id = novel["_id"].as_str().unwrap().to_string();

    let root: Value = h
        .server
        .post("/comments")
        .authorization_bearer(&reader)
        .json(&json!({ "novel": id, "content": "Mở đầu hay" }))
        .await
        .json();
    let root_id = root["_id"].as_str().unwrap().to_string();
    let reply = h
        .server
        .post("/comments")
        .authorization_bearer(&admin)
        .json(&json!({ "novel": id, "content": "Cảm ơn", "parent": root_id }))
        .await;
    assert_eq!(reply.status_code(), 201);

    let deleted = h
        .server
        .delete(&format!("/admin/comments/{}", root_id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(deleted.status_code(), 200);
    let deleted: Value = deleted.json();
    assert_eq!(deleted["removed"], 2);

    let again = h
        .server
        .delete(&format!("/admin/comments/{}", root_id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(again.status_code(), 404);
}
