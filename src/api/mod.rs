// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    ceremony::webauthn::{
        AssertionData, AssertionResponse, AttestationResponse, CreationOptions,
        RegistrationResponse, RequestOptions,
    },
    chain::{Fees, NetworkInfo, SignedTransaction},
    clients::TakeoverResponse,
    models::{
        CreateWalletRequest, CredentialSummary, EmergencyRelationship, OneTimeCode,
        TransactionParams, WalletResponse,
    },
    state::AppState,
};

pub mod credentials;
pub mod emergency;
pub mod health;
pub mod keys;
pub mod login;
pub mod register;
pub mod signing;
pub mod transactions;
pub mod wallets;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);

    let routes = Router::new()
        // Registration and session
        .route("/register/initialize", get(register::register_initialize))
        .route("/register/finalize", post(register::register_finalize))
        .route("/login/initialize", get(login::login_initialize))
        .route("/login/finalize", post(login::login_finalize))
        .route("/otp/login", post(login::otp_login))
        .route("/logout", post(login::logout))
        // Credentials
        .route("/credentials", get(credentials::list_credentials))
        .route("/credentials/initialize", get(credentials::credential_initialize))
        .route("/credentials/finalize", post(credentials::credential_finalize))
        .route("/credentials/{name}", delete(credentials::remove_credential))
        .route("/otp", get(credentials::get_otp).post(credentials::create_otp))
        // Wallets and signing
        .route(
            "/wallets",
            get(wallets::list_wallets).post(wallets::create_wallet),
        )
        .route("/networks", get(wallets::list_networks))
        .route("/fees", get(wallets::estimate_fees))
        .route("/message/sign", post(signing::sign_message))
        .route("/typed-data/sign", post(signing::sign_typed_data_handler))
        .route("/transaction/sign/initialize", post(transactions::sign_initialize))
        .route("/transaction/sign/finalize", post(transactions::sign_finalize))
        .route("/transaction/send/initialize", post(transactions::send_initialize))
        .route("/transaction/send/finalize", post(transactions::send_finalize))
        // Emergency access: owner side
        .route(
            "/emergency-access/contacts",
            get(emergency::list_contacts).post(emergency::invite_contact),
        )
        .route(
            "/emergency-access/contacts/grant-response",
            post(emergency::receive_grant_response),
        )
        .route(
            "/emergency-access/contacts/request-access",
            post(emergency::receive_access_request),
        )
        .route(
            "/emergency-access/contacts/request-takeover",
            post(emergency::receive_takeover_request),
        )
        .route(
            "/emergency-access/contacts/{email}",
            delete(emergency::revoke_contact),
        )
        .route(
            "/emergency-access/contacts/{email}/deny-access",
            post(emergency::deny_access),
        )
        // Emergency access: contact side
        .route(
            "/emergency-access/grants",
            get(emergency::list_grants)
                .post(emergency::receive_invitation)
                .delete(emergency::receive_revocation),
        )
        .route(
            "/emergency-access/grants/deny-access-request",
            post(emergency::receive_denial),
        )
        .route(
            "/emergency-access/grants/respond-invitation",
            post(emergency::respond_invitation),
        )
        .route(
            "/emergency-access/grants/request-access",
            post(emergency::request_access),
        )
        .route(
            "/emergency-access/grants/request-takeover",
            post(emergency::request_takeover),
        )
        // Keys and health
        .route("/jwt-verification-key", get(keys::verification_key))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// The frontend is the only browser origin, and it sends the session cookie.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "frontend URL is not a valid origin; CORS disabled");
            layer
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        register::register_initialize,
        register::register_finalize,
        login::login_initialize,
        login::login_finalize,
        login::otp_login,
        login::logout,
        credentials::list_credentials,
        credentials::credential_initialize,
        credentials::credential_finalize,
        credentials::remove_credential,
        credentials::create_otp,
        credentials::get_otp,
        wallets::list_wallets,
        wallets::create_wallet,
        wallets::list_networks,
        wallets::estimate_fees,
        signing::sign_message,
        signing::sign_typed_data_handler,
        transactions::sign_initialize,
        transactions::sign_finalize,
        transactions::send_initialize,
        transactions::send_finalize,
        emergency::invite_contact,
        emergency::list_contacts,
        emergency::revoke_contact,
        emergency::deny_access,
        emergency::receive_grant_response,
        emergency::receive_access_request,
        emergency::receive_takeover_request,
        emergency::receive_invitation,
        emergency::receive_revocation,
        emergency::receive_denial,
        emergency::list_grants,
        emergency::respond_invitation,
        emergency::request_access,
        emergency::request_takeover,
        keys::verification_key,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            CreationOptions,
            RequestOptions,
            RegistrationResponse,
            AttestationResponse,
            AssertionResponse,
            AssertionData,
            CredentialSummary,
            OneTimeCode,
            CreateWalletRequest,
            WalletResponse,
            TransactionParams,
            SignedTransaction,
            NetworkInfo,
            Fees,
            EmergencyRelationship,
            TakeoverResponse,
            register::RegisterFinalizeRequest,
            login::LoginResponse,
            login::OtpLoginRequest,
            credentials::AddCredentialRequest,
            credentials::CreatedOtp,
            wallets::NetworksResponse,
            signing::SignMessageRequest,
            signing::SignTypedDataRequest,
            signing::SignatureResponse,
            transactions::SentTransaction,
            emergency::InviteContactRequest,
            emergency::GrantInvitationRequest,
            emergency::GrantResponseRequest,
            emergency::RespondInvitationRequest,
            emergency::GrantorRequest,
            emergency::AccessRequestedResponse,
            keys::VerificationKeyResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Registration", description = "Account registration"),
        (name = "Session", description = "Login, one-time code login and logout"),
        (name = "Credentials", description = "WebAuthn credentials and one-time codes"),
        (name = "Wallets", description = "Wallets, networks and fees"),
        (name = "Signing", description = "Message and typed data signatures"),
        (name = "Transactions", description = "Transaction ceremonies"),
        (name = "Emergency Access", description = "Emergency contacts and grants"),
        (name = "Emergency Access Peers", description = "Calls between enclaves"),
        (name = "Keys", description = "Token verification key"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;
