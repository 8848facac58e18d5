use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use serial_dispatch::core::{Config, ErrorCode};
use serial_dispatch::dispatch::{Dispatcher, InboundPipeline, OutboundSerializer, SubsystemHandle};
use serial_dispatch::link::ByteRing;
use serial_dispatch::protocol::frame::encode_frame;
use serial_dispatch::sched::{Step, Worker};
use serial_dispatch::spinner::{
    ChannelState, SimulatedStepper, SmallPayload, SpinnerCatalog, SpinnerController, SpinnerKind,
    SpinnerSettings, SUBSYSTEM_NAME,
};

fn spinner_dispatcher() -> (InboundPipeline, OutboundSerializer, SubsystemHandle<SpinnerCatalog>) {
    let config = Config::default();
    let catalog = SpinnerCatalog::new(&config);
    let mut dispatcher = Dispatcher::new(config).unwrap();
    let handle = dispatcher.register(SUBSYSTEM_NAME, catalog).unwrap();
    let (inbound, outbound) = dispatcher.split();
    (inbound, outbound, handle)
}

fn run_inbound(inbound: &mut InboundPipeline, rx: &mut ByteRing) {
    while inbound.step(rx) == Step::Worked {}
}

fn run_outbound(outbound: &mut OutboundSerializer, tx: &mut ByteRing) -> String {
    while outbound.step(tx) == Step::Worked {}
    let mut bytes = Vec::new();
    while let Some(byte) = tx.pop() {
        bytes.push(byte);
    }
    String::from_utf8(bytes).unwrap()
}

fn frame(region: &str) -> String {
    String::from_utf8(encode_frame(region.as_bytes()).to_vec()).unwrap()
}

#[test]
fn inbound_frame_reaches_spinner_queue() {
    let (mut inbound, mut outbound, mut spinner) = spinner_dispatcher();
    let mut rx = ByteRing::new(1000);
    let mut tx = ByteRing::new(1000);

    rx.push_slice(b"$1,SPINNER,SET_STATE,1,ON*16\r\n");
    run_inbound(&mut inbound, &mut rx);

    let message = spinner.try_recv().unwrap();
    assert_eq!(message.kind(), SpinnerKind::SetState.index());
    assert_eq!(message.transaction_id(), 1);
    assert_eq!(
        *message.payload.small(),
        SmallPayload::StateSet {
            channel: 1,
            state: ChannelState::Running
        }
    );
    assert!(spinner.try_recv().is_none());

    assert_eq!(outbound.step(&mut tx), Step::Idle);
    assert!(tx.is_empty());
}

#[test]
fn dispatcher_error_is_framed() {
    let config = Config::default();
    let dispatcher = Dispatcher::new(config).unwrap();
    dispatcher.reporter().report(ErrorCode::TxBufferFull);

    let (_, mut outbound) = dispatcher.split();
    let mut tx = ByteRing::new(1000);
    assert_eq!(run_outbound(&mut outbound, &mut tx), "$DISPATCHER,ERROR,-7*45\r\n");
}

#[test]
fn each_unroutable_frame_yields_one_error() {
    let cases = [
        ("1,NOBODY,SET_STATE,1,ON", ErrorCode::UnknownSubsystem),
        ("1,SPINNER,SPIN_FASTER,1", ErrorCode::MissingMessageHandler),
        ("1,SPINNER,RET_VAL,0", ErrorCode::MissingMessageHandler),
        ("1,SPINNER,SET_STATE,1,MAYBE", ErrorCode::MessageParsing),
        ("1,SPINNER,GET_STATE,1,2", ErrorCode::MalformedMessage),
        ("one,SPINNER,GET_STATE,1", ErrorCode::MessageParsing),
    ];

    for (region, code) in cases {
        let (mut inbound, mut outbound, mut spinner) = spinner_dispatcher();
        let mut rx = ByteRing::new(1000);
        let mut tx = ByteRing::new(1000);

        rx.push_slice(&encode_frame(region.as_bytes()));
        run_inbound(&mut inbound, &mut rx);

        assert!(spinner.try_recv().is_none(), "{}", region);
        assert_eq!(
            run_outbound(&mut outbound, &mut tx),
            frame(&format!("DISPATCHER,ERROR,{}", code.code())),
            "{}",
            region
        );
    }
}

#[test]
fn corrupted_frame_is_reported_and_next_frame_routes() {
    let (mut inbound, mut outbound, mut spinner) = spinner_dispatcher();
    let mut rx = ByteRing::new(1000);
    let mut tx = ByteRing::new(1000);

    rx.push_slice(b"$1,SPINNER,SET_STATE,1,ON*17\r\n");
    rx.push_slice(b"noise$1,SPINNER,SET_STATE,1,ON*16\r\n");
    run_inbound(&mut inbound, &mut rx);

    assert_eq!(run_outbound(&mut outbound, &mut tx), "$DISPATCHER,ERROR,-6*44\r\n");
    assert!(spinner.try_recv().is_some());
    assert!(spinner.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controller_replies_through_workers() {
    let config = Config {
        idle_poll_interval: Duration::from_millis(1),
        ..Default::default()
    };
    let mut dispatcher = Dispatcher::new(config.clone()).unwrap();
    let handle = dispatcher
        .register(SUBSYSTEM_NAME, SpinnerCatalog::new(&config))
        .unwrap();

    let settings = SpinnerSettings::default();
    let controller = Arc::new(Mutex::new(SpinnerController::new(
        handle,
        SimulatedStepper::new(settings.channel_count, 360.0),
        &settings,
    )));

    let rx = ByteRing::new(config.rx_buffer_size);
    let tx = ByteRing::new(config.tx_buffer_size);
    let comm = dispatcher.start(rx.clone(), tx.clone());
    let spinner = {
        let controller = Arc::clone(&controller);
        Worker::spawn("spinner", 5, Duration::from_millis(1), move || controller.lock().step())
    };

    rx.push_slice(&encode_frame(b"7,SPINNER,SET_PLAN,0,1000,50"));
    rx.push_slice(&encode_frame(b"8,SPINNER,GET_STATE,0"));

    let expected = [
        frame("7,SPINNER,RET_VAL,0"),
        frame("8,SPINNER,STATE_REPLY,0,STOPPED,0,0.000000"),
    ]
    .concat();

    let mut received = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while received.len() < expected.len() && tokio::time::Instant::now() < deadline {
        match tx.pop() {
            Some(byte) => received.push(byte),
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }

    assert_eq!(String::from_utf8(received).unwrap(), expected);
    assert_eq!(controller.lock().plan(0).unwrap().len(), 1);

    spinner.shutdown().await.unwrap();
    comm.shutdown().await.unwrap();
}

#[tokio::test]
async fn error_frame_trickles_through_small_tx_ring() {
    let config = Config {
        idle_poll_interval: Duration::from_millis(1),
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(config).unwrap();
    dispatcher.reporter().report(ErrorCode::TxBufferFull);

    // Smaller than one error frame, drained only by this task
    let tx = ByteRing::new(8);
    let comm = dispatcher.start(ByteRing::new(64), tx.clone());

    let expected = "$DISPATCHER,ERROR,-7*45\r\n";
    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        let mut received = Vec::new();
        while received.len() < expected.len() {
            match tx.pop() {
                Some(byte) => received.push(byte),
                None => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
        received
    })
    .await
    .expect("tx worker stalled the runtime");

    assert_eq!(String::from_utf8(drained).unwrap(), expected);
    comm.shutdown().await.unwrap();
}
