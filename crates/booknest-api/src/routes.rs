use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use booknest_core::ListTurn;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    admin, auth, catalog, files, health, inbox, novels, settings, social, tags,
};
use crate::AppState;

const HOME_LIST_SIZE: usize = 10;
const NEW_LIST_SIZE: usize = 15;

fn fixed(turn: ListTurn, limit: usize) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>| novels::fixed_list(state, turn, limit))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/signup", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/getmyinfo", get(auth::me))
        .route("/profile", patch(auth::update_profile))
        .route("/notifications", get(auth::notifications))
        .route("/readnotis", post(auth::read_notifications))
        .route("/vote", post(auth::vote))
        .route("/myvotes", get(auth::my_votes))
}

fn novel_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(novels::create))
        .route("/all", get(novels::mine))
        .route("/edit/{id}", patch(novels::edit))
        // Home page lists
        .route("/new", fixed(ListTurn::Newest, NEW_LIST_SIZE))
        .route("/newnovels", fixed(ListTurn::Newest, NEW_LIST_SIZE))
        .route("/newest", fixed(ListTurn::Newest, HOME_LIST_SIZE))
        .route("/modvote", fixed(ListTurn::ModVote, HOME_LIST_SIZE))
        .route("/hot", fixed(ListTurn::ModVote, HOME_LIST_SIZE))
        .route("/hasnewchap", fixed(ListTurn::HasNewChap, HOME_LIST_SIZE))
        .route("/mostviews", fixed(ListTurn::MostViews, HOME_LIST_SIZE))
        .route("/mostlikes", fixed(ListTurn::MostLikes, HOME_LIST_SIZE))
        .route("/mostfollow", fixed(ListTurn::MostFollow, HOME_LIST_SIZE))
        .route("/bestrates", fixed(ListTurn::BestRates, HOME_LIST_SIZE))
        .route("/bestvotes", fixed(ListTurn::BestVotes, HOME_LIST_SIZE))
        // Filtered listings
        .route("/turn/{turn}", get(novels::by_turn))
        .route("/getbycate/{id}", get(novels::by_category))
        .route("/getcompleted/{id}", get(novels::completed_in_category))
        .route("/bestviews/{id}", get(novels::most_viewed_in_category))
        .route("/filterincate/{id}", get(novels::filter_in_category))
        .route("/getbyauthor/{id}", get(novels::by_author))
        .route("/search/{text}", get(novels::search))
        // Chapters
        .route("/chaps/{id}", get(novels::chapters))
        .route("/fullchaps/{id}", get(novels::all_chapters))
        .route("/chap/{id}/{n}", get(novels::read_chapter))
        .route("/newchap", post(novels::new_chapter))
        // Follows and ratings under their older paths
        .route("/checkfollow/{id}", get(social::check_follow))
        .route("/follow/{id}", get(social::follow_by_path))
        .route("/cancelfollow/{id}", get(social::unfollow))
        .route("/myfollowed", get(social::my_follows))
        .route("/ratting", post(social::rate))
        .route("/checkrated/{id}", get(social::check_rated))
        .route("/allrates/{id}", get(social::novel_ratings))
        // Moderation
        .route("/admin/pending", get(novels::pending))
        .route("/admin/approve/{id}", patch(novels::approve))
        .route("/admin/reject/{id}", delete(novels::reject))
        .route("/admin/modvote/{id}", patch(novels::toggle_modvote))
        // Novel by slug or id
        .route("/{key}", get(novels::by_slug))
        .route("/{key}/chaps", get(novels::chapters))
}

fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tags::list).post(tags::create))
        .route(
            "/{id}",
            get(tags::get).patch(tags::update).delete(tags::delete),
        )
}

fn follow_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(social::follow))
        .route("/me", get(social::my_follows))
        .route("/check/{id}", get(social::check_follow))
        .route("/{id}", delete(social::unfollow))
}

fn rating_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(social::rate))
        .route("/check/{id}", get(social::check_rated))
        .route("/novel/{id}", get(social::novel_ratings))
}

fn comment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(social::comment))
        .route("/novel/{id}", get(social::novel_comments))
        .route("/replies/{id}", get(social::replies))
}

fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/sendmess", post(inbox::send))
        .route("/mysent", get(inbox::sent))
        .route("/myrecieved", get(inbox::received))
}

fn category_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route("/mycateid/{slug}", get(catalog::category_by_slug))
        .route(
            "/{id}",
            patch(catalog::update_category).delete(catalog::delete_category),
        )
}

fn author_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(catalog::create_author))
        .route("/search/{text}", get(catalog::search_authors))
        .route("/getbyslug/{slug}", get(catalog::author_by_slug))
}

fn file_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(files::upload).layer(DefaultBodyLimit::max(files::MAX_UPLOAD_BYTES)),
        )
        .route("/posters", get(files::posters))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::users))
        .route("/users/{id}/role", patch(admin::set_role))
        .route("/novels", get(admin::novels))
        .route(
            "/novels/{id}",
            patch(admin::update_novel).delete(admin::delete_novel),
        )
        .route("/comments/pending", get(admin::pending_comments))
        .route("/comments/{id}/approve", patch(admin::approve_comment))
        .route("/comments/{id}", delete(admin::delete_comment))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/settings", get(settings::get).post(settings::update))
        .nest("/auth", auth_routes())
        .nest("/novels", novel_routes())
        .nest("/tags", tag_routes())
        .nest("/follows", follow_routes())
        .nest("/ratings", rating_routes())
        .nest("/comments", comment_routes())
        .nest("/mess", message_routes())
        .nest("/category", category_routes())
        .nest("/categories", category_routes())
        .nest("/author", author_routes())
        .nest("/authors", author_routes())
        .nest("/file", file_routes())
        .nest("/admin", admin_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}
