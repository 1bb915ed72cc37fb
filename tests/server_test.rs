//! Integration tests for the HTTP event ingest

#[cfg(feature = "server")]
mod server_tests {
    use night_wander::adaptor::EventSource;
    use night_wander::create_shared_stats;
    use night_wander::server::run;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_endpoint() {
        let source = EventSource::new();
        let stats = create_shared_stats();
        stats.record_alert();

        let (addr, shutdown_tx) = run(0, source.sender(), stats)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
        assert_eq!(body["stats"]["alerts_sent"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_events_reach_the_channel() {
        let source = EventSource::new();
        let (addr, shutdown_tx) = run(0, source.sender(), create_shared_stats())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let single = serde_json::json!({
            "sensorId": "ADT1",
            "timestamp": 1_700_000_000.5,
            "characteristic": "binary_sensor",
            "data": "on"
        });
        let response = client
            .post(format!("http://{}/events", addr))
            .json(&single)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["accepted"], 1);

        let batch = serde_json::json!([
            {"id": "ADT2", "timeStamp": 1_700_000_001.0, "characteristic": "binary_sensor", "data": "off"},
            {"id": "ADT3", "timeStamp": 1_700_000_002.0, "characteristic": "temperature", "data": "21.5"}
        ]);
        let response = client
            .post(format!("http://{}/events", addr))
            .json(&batch)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let first = source.try_recv().expect("first message queued");
        assert_eq!(first.sensor_id, "ADT1");
        assert_eq!(first.timestamp, 1_700_000_000.5);
        assert_eq!(source.try_recv().map(|m| m.sensor_id), Some("ADT2".to_string()));
        assert_eq!(source.try_recv().map(|m| m.characteristic), Some("temperature".to_string()));
        assert!(source.try_recv().is_none());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected() {
        let source = EventSource::new();
        let (addr, shutdown_tx) = run(0, source.sender(), create_shared_stats())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/events", addr))
            .json(&serde_json::json!({"sensorId": "ADT1"}))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_client_error());
        assert!(source.try_recv().is_none());

        let _ = shutdown_tx.send(());
    }
}
