use std::time::Duration;

use chrono::{TimeZone, Utc};
use evohome_hub::{
    ControllerMode, Error, HttpRemote, Hub, MessageLogMode, Refresh, Remote, SetpointMode,
    Temperature, TickOutcome, ZoneId, ZoneState,
};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use wiremock::matchers::{body_json, body_partial_json, body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ZONE: &str = "3432521";

fn installation() -> Value {
    json!([{
        "locationInfo": {
            "locationId": "2738909",
            "name": "My Home",
            "streetAddress": "1 Main Street",
            "city": "London",
            "postcode": "E1 1AA",
            "locationOwner": {"userId": "2263181", "username": "user@example.com", "firstname": "Jo", "lastname": "Bloggs"}
        },
        "gateways": [{
            "gatewayInfo": {"gatewayId": "2499896", "mac": "00D02DEE0000", "crc": "1234", "isWiFi": false},
            "temperatureControlSystems": [{
                "systemId": "2499897",
                "modelType": "EvoTouch",
                "zones": [
                    {
                        "zoneId": ZONE,
                        "name": "Living Room",
                        "zoneType": "RadiatorZone",
                        "setpointCapabilities": {
                            "maxHeatSetpoint": 35.0,
                            "minHeatSetpoint": 5.0,
                            "valueResolution": 0.5,
                            "allowedSetpointModes": ["PermanentOverride", "FollowSchedule", "TemporaryOverride"]
                        }
                    },
                    {
                        "zoneId": "3432522",
                        "name": "Kitchen",
                        "zoneType": "RadiatorZone",
                        "setpointCapabilities": {
                            "maxHeatSetpoint": 35.0,
                            "minHeatSetpoint": 5.0,
                            "valueResolution": 0.5,
                            "allowedSetpointModes": ["PermanentOverride", "FollowSchedule", "TemporaryOverride"]
                        }
                    }
                ],
                "dhw": {
                    "dhwId": "3933910",
                    "dhwStateCapabilitiesResponse": {
                        "allowedStates": ["On", "Off"],
                        "allowedModes": ["FollowSchedule", "PermanentOverride", "TemporaryOverride"]
                    }
                },
                "allowedSystemModes": [
                    {"systemMode": "HeatingOff"}, {"systemMode": "Auto"}, {"systemMode": "AutoWithReset"},
                    {"systemMode": "AutoWithEco"}, {"systemMode": "Away"}, {"systemMode": "DayOff"},
                    {"systemMode": "Custom"}
                ]
            }]
        }]
    }])
}

fn location_status(mode: &str, kitchen_target: f64) -> Value {
    json!({
        "locationId": "2738909",
        "gateways": [{
            "gatewayId": "2499896",
            "temperatureControlSystems": [{
                "systemId": "2499897",
                "zones": [
                    {
                        "zoneId": ZONE,
                        "name": "Living Room",
                        "temperatureStatus": {"temperature": 19.5, "isAvailable": true},
                        "setpointStatus": {"targetHeatTemperature": 21.0, "setpointMode": "FollowSchedule"},
                        "activeFaults": []
                    },
                    {
                        "zoneId": "3432522",
                        "name": "Kitchen",
                        "temperatureStatus": {"temperature": 18.0, "isAvailable": true},
                        "setpointStatus": {"targetHeatTemperature": kitchen_target, "setpointMode": "FollowSchedule"},
                        "activeFaults": []
                    }
                ],
                "dhw": {
                    "dhwId": "3933910",
                    "temperatureStatus": {"temperature": 48.0, "isAvailable": true},
                    "stateStatus": {"state": "On", "mode": "FollowSchedule"},
                    "activeFaults": []
                },
                "activeFaults": [],
                "systemModeStatus": {"mode": mode, "isPermanent": true}
            }]
        }]
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/Auth/OAuth/Token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-1",
            "token_type": "bearer",
            "expires_in": 1800,
            "refresh_token": "refresh-1"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/userAccount"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "userId": "2263181",
            "username": "user@example.com"
        })))
        .mount(server)
        .await;
}

async fn mount_installation(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/location/installationInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(installation()))
        .mount(server)
        .await;
}

fn remote(server: &MockServer) -> HttpRemote {
    HttpRemote::builder("user@example.com", "secret")
        .auth_url(format!("{}/Auth/OAuth/Token", server.uri()))
        .v2_base_url(format!("{}/v2", server.uri()))
        .v1_base_url(format!("{}/v1", server.uri()))
        .build()
        .expect("remote should build")
}

async fn logged_in(server: &MockServer) -> HttpRemote {
    mount_login(server).await;
    let remote = remote(server);
    remote.reauthenticate().await.expect("login should succeed");
    remote
}

#[tokio::test]
async fn login_reports_token_lifetime() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let session = remote(&server).reauthenticate().await.unwrap();
    assert_eq!(session.lifetime, Duration::from_secs(1800));
}

#[tokio::test]
async fn rejected_credentials_are_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Auth/OAuth/Token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let err = remote(&server).reauthenticate().await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)), "got {err:?}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn requests_before_login_fail_as_authentication() {
    let server = MockServer::start().await;
    let err = remote(&server).fetch_status("2738909").await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn installation_and_status_map_to_domain() {
    let server = MockServer::start().await;
    mount_installation(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/location/2738909/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(location_status("AutoWithEco", 18.0)))
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    let installations = remote.fetch_installations().await.unwrap();
    assert_eq!(installations.len(), 1);
    let topology = &installations[0];
    assert_eq!(topology.location_name, "My Home");
    assert_eq!(topology.zones.len(), 2);
    assert_eq!(topology.zones[1].name, "Kitchen");

    let status = remote.fetch_status(&topology.location_id).await.unwrap();
    assert_eq!(status.mode, ControllerMode::AutoWithEco);
    assert_eq!(status.zones[0].current, Some(Temperature::from_celsius(19.5)));
    assert_eq!(status.zones[0].setpoint_mode, SetpointMode::FollowSchedule);
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/location/.+/status$"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    let err = remote.fetch_status("2738909").await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn unexpected_shape_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/location/2738909/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gateways": "nope"})))
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    let err = remote.fetch_status("2738909").await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn schedule_fetch_parses_weekdays() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/temperatureZone/{ZONE}/schedule")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dailySchedules": [
                {"dayOfWeek": "Saturday", "switchpoints": [
                    {"heatSetpoint": 21.0, "timeOfDay": "08:00:00"},
                    {"heatSetpoint": 15.0, "timeOfDay": "23:00:00"}
                ]}
            ]
        })))
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    let schedule = remote.fetch_zone_schedule(&ZoneId::new(ZONE)).await.unwrap();
    assert_eq!(schedule.day(chrono::Weekday::Sat).len(), 2);
}

#[tokio::test]
async fn reset_is_sent_as_auto_with_reset() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/temperatureControlSystem/2499897/mode"))
        .and(body_json(json!({"SystemMode": "AutoWithReset", "TimeUntil": null, "Permanent": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "840367013"})))
        .expect(1)
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    remote
        .apply_controller_mode("2499897", ControllerMode::Reset)
        .await
        .unwrap();
}

#[tokio::test]
async fn zone_override_and_cancel_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/v2/temperatureZone/{ZONE}/heatSetpoint")))
        .and(body_partial_json(json!({
            "HeatSetpointValue": 22.5,
            "SetpointMode": "TemporaryOverride",
            "TimeUntil": "2024-03-12T18:00:00Z"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/v2/temperatureZone/{ZONE}/heatSetpoint")))
        .and(body_partial_json(json!({"SetpointMode": "FollowSchedule"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    let until = Utc.with_ymd_and_hms(2024, 3, 12, 18, 0, 0).unwrap();
    let zone = ZoneId::new(ZONE);
    remote
        .apply_zone_override(&zone, Temperature::from_celsius(22.5), Some(until))
        .await
        .unwrap();
    remote.clear_zone_override(&zone).await.unwrap();
}

#[tokio::test]
async fn dhw_follow_schedule_sends_empty_state() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/domesticHotWater/3933910/state"))
        .and(body_json(json!({"State": "", "Mode": "FollowSchedule", "UntilTime": null})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let remote = logged_in(&server).await;

    remote
        .apply_dhw_state("3933910", None, SetpointMode::FollowSchedule, None)
        .await
        .unwrap();
}

async fn mount_v1(server: &MockServer, indoor: f64) {
    Mock::given(method("POST"))
        .and(path("/v1/Session"))
        .and(body_partial_json(json!({"Username": "user@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionId": "session-1",
            "userInfo": {"userID": 2263181, "username": "user@example.com"}
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/locations"))
        .and(header("sessionId", "session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "locationID": 2738909,
            "devices": [
                {"deviceID": 3432521, "thermostat": {"indoorTemperature": indoor}},
                {"deviceID": 3432522, "thermostat": {"indoorTemperature": 128}}
            ]
        }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn v1_temperatures_reuse_session_and_skip_sentinel() {
    let server = MockServer::start().await;
    mount_v1(&server, 19.87).await;
    let remote = remote(&server);

    for _ in 0..2 {
        let precise = remote.fetch_precise_temperatures().await.unwrap();
        assert_eq!(precise.len(), 2);
        assert_eq!(precise[0].temperature, Some(Temperature::from_celsius(19.87)));
        assert_eq!(precise[1].temperature, None);
    }
}

#[tokio::test]
async fn v1_failure_is_precision_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/Session"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = remote(&server).fetch_precise_temperatures().await.unwrap_err();
    assert!(matches!(err, Error::PrecisionUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn message_log_is_redacted_ndjson() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_installation(&server).await;
    let log = NamedTempFile::new().unwrap();

    let remote = HttpRemote::builder("user@example.com", "secret")
        .auth_url(format!("{}/Auth/OAuth/Token", server.uri()))
        .v2_base_url(format!("{}/v2", server.uri()))
        .message_log(MessageLogMode::Full, log.path())
        .build()
        .unwrap();
    remote.reauthenticate().await.unwrap();
    remote.fetch_installations().await.unwrap();

    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert!(!contents.contains("secret"));
    assert!(!contents.contains("token-1"));
    assert!(!contents.contains("1 Main Street"));
    assert!(!contents.contains("00D02DEE0000"));

    let lines: Vec<Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // token, account and installation: one request and one response each
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[4]["dir"], "req");
    assert_eq!(lines[5]["dir"], "resp");
    assert_eq!(lines[4]["id"], lines[5]["id"]);
    assert_eq!(lines[5]["body"][0]["locationInfo"]["name"], "My Home");
}

#[tokio::test]
async fn hub_over_http_refreshes_and_derives_state() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_installation(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/location/2738909/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(location_status("Auto", 5.0)))
        .expect(1)
        .mount(&server)
        .await;

    let hub = Hub::builder(remote(&server)).build();
    let now = Utc.with_ymd_and_hms(2024, 3, 12, 10, 0, 0).unwrap();

    assert_eq!(hub.tick(now).await.unwrap(), TickOutcome::Refreshed(Refresh::Full));
    assert_eq!(hub.tick(now).await.unwrap(), TickOutcome::Skipped);

    assert_eq!(hub.zone_state(&ZoneId::new(ZONE)).unwrap(), ZoneState::Auto);
    assert_eq!(
        hub.zone_state(&ZoneId::new("3432522")).unwrap(),
        ZoneState::OpenWindow
    );
}
