use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use telemetry_ledger::{
    batch::{BatchAggregator, PendingBatch},
    flush::{FlushDriver, FlushState},
    ledger::{
        AccountSigner, Aggregate, MemoryLedger, Request, Response, TransactionSubmitter,
        spawn_submission_worker,
    },
    sensor::{MeasurementKind, RawReading, SensorId, SensorRegistry},
};

const SENSORS: usize = 50;
const READINGS_PER_SENSOR: u64 = 100;

fn sensor_name(i: usize) -> String {
    format!("esp8266_{i:02}")
}

fn start(ledger: &MemoryLedger, names: &[String]) -> (BatchAggregator, FlushDriver) {
    let registry: SensorRegistry = names
        .iter()
        .map(|name| (name.clone(), ledger.register(name)))
        .collect();
    let aggregator = BatchAggregator::new(registry);

    let submitter = TransactionSubmitter::new(
        ledger.clone(),
        AccountSigner::from_seed(&[9u8; 32]),
        0,
        Duration::from_secs(10),
    );
    let (submissions, _) = spawn_submission_worker(submitter);
    let driver = FlushDriver::new(aggregator.clone(), submissions, Duration::from_secs(600));

    (aggregator, driver)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connections_lose_nothing() {
    let ledger = MemoryLedger::new();
    let names: Vec<String> = (0..SENSORS).map(sensor_name).collect();
    let (aggregator, mut driver) = start(&ledger, &names);

    let producers: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move {
                for ts in 0..READINGS_PER_SENSOR {
                    let line = RawReading {
                        name: name.clone(),
                        timestamp: 1_700_000_000 + ts,
                        signal_strength: -70,
                        ..Default::default()
                    }
                    .encode()
                    .unwrap();

                    let reading = RawReading::decode(&line).unwrap();
                    aggregator.append(&reading).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.unwrap();
    }

    let report = driver.flush().await;
    assert_eq!(report.committed.len(), SENSORS);
    assert_eq!(report.committed_points, SENSORS * READINGS_PER_SENSOR as usize);
    assert!(report.retained.is_empty());
    assert!(aggregator.is_empty());

    let committed = ledger.committed();
    assert_eq!(committed.len(), SENSORS);

    let mut seen = HashSet::new();
    for tx in &committed {
        let Request::SubmitMeasurements {
            sensor_id,
            measurements,
        } = Request::from_cbor(&tx.call.data).unwrap()
        else {
            panic!("expected submit_measurements");
        };
        assert!(seen.insert(sensor_id), "sensor {sensor_id} submitted twice");

        let points = &measurements[&MeasurementKind::SignalStrength];
        let timestamps: Vec<u64> = points.iter().map(|p| p.timestamp - 1_700_000_000).collect();
        assert_eq!(timestamps, (0..READINGS_PER_SENSOR).collect::<Vec<_>>());
    }

    let nonces: Vec<u64> = committed.iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, (0..SENSORS as u64).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swap_never_splits_a_reading() {
    const PRODUCERS: usize = 8;
    const READINGS: u64 = 500;

    let registry: SensorRegistry = (0..PRODUCERS)
        .map(|i| (sensor_name(i), SensorId::from(i as u64 + 1)))
        .collect();
    let aggregator = BatchAggregator::new(registry);
    let done = Arc::new(AtomicBool::new(false));

    let swapper = {
        let aggregator = aggregator.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut batches = Vec::new();
            while !done.load(Ordering::Acquire) {
                let batch = aggregator.swap_and_clear();
                if !batch.is_empty() {
                    batches.push(batch);
                }
                tokio::task::yield_now().await;
            }
            batches
        })
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|i| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move {
                for ts in 0..READINGS {
                    let appended = aggregator
                        .append(&RawReading {
                            name: sensor_name(i),
                            timestamp: ts,
                            signal_strength: -40,
                            pressure: 101_325,
                            temperature: 2150,
                            ..Default::default()
                        })
                        .unwrap();
                    assert_eq!(appended, 3);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.unwrap();
    }
    done.store(true, Ordering::Release);

    let mut batches: Vec<PendingBatch> = swapper.await.unwrap();
    batches.push(aggregator.swap_and_clear());

    let total: usize = batches.iter().map(PendingBatch::point_count).sum();
    assert_eq!(total, PRODUCERS * READINGS as usize * 3);

    for batch in &batches {
        for sensor_id in batch.sensor_ids() {
            let signal = batch.points(sensor_id, MeasurementKind::SignalStrength).len();
            let pressure = batch.points(sensor_id, MeasurementKind::Pressure).len();
            let temperature = batch.points(sensor_id, MeasurementKind::Temperature).len();
            assert_eq!(signal, pressure, "sensor {sensor_id}");
            assert_eq!(pressure, temperature, "sensor {sensor_id}");
        }
    }
}

#[tokio::test]
async fn test_failed_sensor_is_retried_without_resubmitting_others() {
    let ledger = MemoryLedger::new();
    let names = vec!["a".to_string(), "b".to_string()];
    let (aggregator, mut driver) = start(&ledger, &names);
    let a = aggregator.registry().get("a").unwrap();
    let b = aggregator.registry().get("b").unwrap();

    for name in ["a", "b"] {
        aggregator
            .append(&RawReading {
                name: name.to_string(),
                timestamp: 10,
                signal_strength: -60,
                pressure: 101_325,
                temperature: 2150,
                ..Default::default()
            })
            .unwrap();
    }

    ledger.reject_sensor(a);
    let first = driver.flush().await;
    assert_eq!(first.committed, vec![b]);
    assert_eq!(first.retained, vec![a]);
    assert_eq!(driver.state(), FlushState::Idle);

    ledger.accept_sensor(a);
    let second = driver.flush().await;
    assert_eq!(second.committed, vec![a]);
    assert_eq!(second.committed_points, 3);

    for sensor in [a, b] {
        assert_eq!(ledger.measurements(sensor, MeasurementKind::Pressure).len(), 1);
        assert_eq!(ledger.measurements(sensor, MeasurementKind::Temperature).len(), 1);
        assert_eq!(ledger.measurements(sensor, MeasurementKind::Temperature)[0].value, 2150);
    }

    let third = driver.flush().await;
    assert_eq!(third.attempted(), 0);
    assert_eq!(ledger.committed().len(), 2);
}

#[tokio::test]
async fn test_readings_from_unknown_sensors_never_reach_the_ledger() {
    let ledger = MemoryLedger::new();
    let (aggregator, mut driver) = start(&ledger, &["kitchen".to_string()]);

    let stranger = RawReading {
        name: "stranger".to_string(),
        timestamp: 1,
        signal_strength: -10,
        ..Default::default()
    };
    assert!(aggregator.append(&stranger).is_err());

    let report = driver.flush().await;
    assert_eq!(report.attempted(), 0);
    assert!(ledger.committed().is_empty());
}

#[tokio::test]
async fn test_registered_sensor_can_be_queried() {
    let ledger = MemoryLedger::new();
    let submitter = TransactionSubmitter::new(
        ledger.clone(),
        AccountSigner::from_seed(&[4u8; 32]),
        0,
        Duration::from_secs(10),
    );
    let (submissions, worker) = spawn_submission_worker(submitter);

    let Response::RegisterSensor { sensor_id } = submissions
        .submit(Request::RegisterSensor {
            sensor: telemetry_ledger::sensor::SensorDescriptor {
                name: "esp2866_bedroom".to_string(),
                measurement_kinds: vec![MeasurementKind::Temperature, MeasurementKind::Humidity],
                storage_granularity: 600,
                query_granularity: 14_400,
            },
        })
        .await
        .unwrap()
    else {
        panic!("expected register_sensor reply");
    };
    assert_ne!(sensor_id, SensorId::from(0));

    let Response::GetSensorsByName { sensors } = submissions
        .submit(Request::GetSensorsByName {
            sensor_names: vec!["esp2866_bedroom".to_string()],
        })
        .await
        .unwrap()
    else {
        panic!("expected get_sensors_by_name reply");
    };
    let registry = SensorRegistry::from_lookup(&sensors);
    assert_eq!(registry.get("esp2866_bedroom"), Some(sensor_id));

    let aggregator = BatchAggregator::new(registry);
    let mut driver = FlushDriver::new(aggregator.clone(), submissions.clone(), Duration::from_secs(600));
    for (timestamp, temperature) in [(1_657_541_274, 2350), (1_657_541_284, 2360), (1_657_541_294, 2350)] {
        aggregator
            .append(&RawReading {
                name: "esp2866_bedroom".to_string(),
                timestamp,
                signal_strength: -50,
                pressure: 100_000,
                temperature,
                ..Default::default()
            })
            .unwrap();
    }
    driver.flush().await;

    let query = |aggregate| Request::Query {
        sensor_id,
        measurement_kind: MeasurementKind::Temperature,
        aggregate,
        start: 1_657_540_000,
        end: 1_657_550_000,
    };
    assert_eq!(
        submissions.submit(query(Aggregate::Max)).await.unwrap(),
        Response::Query { value: 2360 }
    );
    assert_eq!(
        submissions.submit(query(Aggregate::Min)).await.unwrap(),
        Response::Query { value: 2350 }
    );

    let empty = submissions
        .submit(Request::Query {
            sensor_id,
            measurement_kind: MeasurementKind::Humidity,
            aggregate: Aggregate::Avg,
            start: 0,
            end: 1,
        })
        .await
        .unwrap();
    assert_eq!(empty, Response::Empty);

    drop(driver);
    drop(submissions);
    worker.await.unwrap();
}
